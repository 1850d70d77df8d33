//! Generic MCP tool backed by an external CLI

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::Result;
use crate::config::ShipdeckConfig;
use crate::dispatch::CommandDispatcher;
use crate::journal::{ExecutionJournal, JournalEntry};
use crate::mcp::{McpTool, McpToolResult};
use crate::tools::argv::ArgVector;
use crate::tools::normalize::{Envelope, ExitPolicy, envelope_result, text_result};
use crate::tools::request::ToolRequest;
use crate::tools::schema::ToolSchema;

/// Builds the command line for one call
pub type BuildFn = fn(&ToolRequest) -> Result<ArgVector>;

/// Fills artifacts and summary of a successful envelope
pub type FinishFn = fn(&ToolRequest, &mut Envelope);

/// Shape of the tool result
#[derive(Clone, Copy)]
pub enum OutputMode {
    Text,
    Envelope { label: &'static str, finish: FinishFn },
}

/// Schema plus command construction for one tool
pub struct ToolSpec {
    pub schema: ToolSchema,
    build: BuildFn,
    output: OutputMode,
    exit_policy: ExitPolicy,
}

impl ToolSpec {
    pub fn text(schema: ToolSchema, build: BuildFn) -> Self {
        Self {
            schema,
            build,
            output: OutputMode::Text,
            exit_policy: ExitPolicy::Strict,
        }
    }

    pub fn envelope(schema: ToolSchema, label: &'static str, build: BuildFn, finish: FinishFn) -> Self {
        Self {
            schema,
            build,
            output: OutputMode::Envelope { label, finish },
            exit_policy: ExitPolicy::Strict,
        }
    }

    /// Non-zero exit with output is a findings report, not a failure
    pub fn findings(mut self) -> Self {
        self.exit_policy = ExitPolicy::Findings;
        self
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn output(&self) -> OutputMode {
        self.output
    }

    /// Command line for the given raw arguments, without running it
    pub fn command_for(&self, arguments: Value) -> Result<ArgVector> {
        let request = ToolRequest::from_arguments(&self.schema, arguments)?;
        (self.build)(&request)
    }
}

/// Shared execution context of every registered tool
pub struct ToolContext {
    pub dispatcher: Arc<dyn CommandDispatcher>,
    pub journal: ExecutionJournal,
    /// Environment passed to every invocation
    pub env: BTreeMap<String, String>,
    pub max_response_chars: usize,
}

impl ToolContext {
    pub fn new(dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            journal: ExecutionJournal::default(),
            env: BTreeMap::new(),
            max_response_chars: 80_000,
        }
    }

    pub fn from_config(config: &ShipdeckConfig, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            journal: ExecutionJournal::from_config(&config.output),
            env: config.execution.env.clone(),
            max_response_chars: config.output.max_response_chars,
        }
    }
}

/// [`McpTool`] that runs a [`ToolSpec`] through the context's dispatcher
pub struct CliTool {
    spec: ToolSpec,
    ctx: Arc<ToolContext>,
}

impl CliTool {
    pub fn new(spec: ToolSpec, ctx: Arc<ToolContext>) -> Self {
        Self { spec, ctx }
    }

    fn reject(&self, error: crate::Error) -> McpToolResult {
        debug!("{} rejected before dispatch: {}", self.spec.name(), error);
        match self.spec.output {
            OutputMode::Text => McpToolResult::error(error.to_string()),
            OutputMode::Envelope { label, .. } => {
                Envelope::error(error.to_string(), format!("{label} failed: {error}"))
                    .into_tool_result()
            }
        }
    }
}

#[async_trait]
impl McpTool for CliTool {
    fn schema(&self) -> &ToolSchema {
        &self.spec.schema
    }

    async fn execute(&self, arguments: Value) -> Result<McpToolResult> {
        let request = ToolRequest::from_arguments(&self.spec.schema, arguments)?;
        let argv = match (self.spec.build)(&request) {
            Ok(argv) => argv,
            Err(e) => return Ok(self.reject(e)),
        };

        let invocation = argv.into_invocation(self.spec.name(), &self.ctx.env);
        info!(
            tool = %invocation.tool,
            dispatcher = self.ctx.dispatcher.name(),
            "Executing: {}",
            invocation.command_line()
        );

        let mut entry = JournalEntry::begin(&invocation);
        let outcome = self.ctx.dispatcher.execute(&invocation).await;

        let result = match self.spec.output {
            OutputMode::Text => text_result(
                self.spec.name(),
                &outcome,
                self.spec.exit_policy,
                self.ctx.max_response_chars,
            ),
            OutputMode::Envelope { label, finish } => {
                envelope_result(label, &outcome, self.spec.exit_policy, |envelope| {
                    finish(&request, envelope)
                })
                .into_tool_result()
            }
        };

        entry.complete(&outcome, !result.is_error());
        self.ctx.journal.record(&entry).await;
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use crate::tools::schema::ParamSpec;
    use serde_json::json;

    fn build_echo(req: &ToolRequest) -> Result<ArgVector> {
        Ok(ArgVector::new("echo").arg(req.require("message")?))
    }

    fn finish_echo(_req: &ToolRequest, envelope: &mut Envelope) {
        envelope
            .summary
            .insert("length".into(), json!(envelope.stdout.len()));
    }

    fn schema() -> ToolSchema {
        ToolSchema::new("echo_tool", "Echo").param(ParamSpec::string("message", "Text").required())
    }

    fn text(result: &McpToolResult) -> String {
        result.text_content()
    }

    fn tool(spec: ToolSpec, dispatcher: Arc<RecordingDispatcher>) -> CliTool {
        CliTool::new(spec, Arc::new(ToolContext::new(dispatcher)))
    }

    #[tokio::test]
    async fn test_missing_required_never_dispatches() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let tool = tool(ToolSpec::text(schema(), build_echo), Arc::clone(&dispatcher));
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text(&result), "message is required");
        assert!(dispatcher.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_text_tool_dispatches_argv() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let tool = tool(ToolSpec::text(schema(), build_echo), Arc::clone(&dispatcher));
        let result = tool.execute(json!({"message": "hi"})).await.unwrap();
        assert!(result.is_error.is_none());
        assert_eq!(text(&result), "echo hi");
        let calls = dispatcher.calls().await;
        assert_eq!(calls[0].tool, "echo_tool");
    }

    #[tokio::test]
    async fn test_envelope_missing_required_is_json() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let spec = ToolSpec::envelope(schema(), "Echo", build_echo, finish_echo);
        let tool = tool(spec, Arc::clone(&dispatcher));
        let result = tool.execute(json!({"message": ""})).await.unwrap();
        let parsed: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["stderr"], "message is required");
        assert!(dispatcher.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_envelope_success_summary() {
        let dispatcher = Arc::new(RecordingDispatcher::with_output("abc", "", 0));
        let spec = ToolSpec::envelope(schema(), "Echo", build_echo, finish_echo);
        let tool = tool(spec, dispatcher);
        let result = tool.execute(json!({"message": "x"})).await.unwrap();
        let parsed: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["summary"]["length"], 3);
    }

    #[tokio::test]
    async fn test_findings_policy() {
        let dispatcher = Arc::new(RecordingDispatcher::with_output("2 failures", "", 1));
        let strict = tool(ToolSpec::text(schema(), build_echo), Arc::clone(&dispatcher));
        assert_eq!(
            strict.execute(json!({"message": "x"})).await.unwrap().is_error,
            Some(true)
        );

        let lenient = tool(ToolSpec::text(schema(), build_echo).findings(), dispatcher);
        assert!(
            lenient
                .execute(json!({"message": "x"}))
                .await
                .unwrap()
                .is_error
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_context_env_reaches_dispatcher() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let mut ctx = ToolContext::new(Arc::clone(&dispatcher) as Arc<dyn CommandDispatcher>);
        ctx.env.insert("DOCKER_HOST".into(), "unix:///run/docker.sock".into());
        let tool = CliTool::new(ToolSpec::text(schema(), build_echo), Arc::new(ctx));
        tool.execute(json!({"message": "x"})).await.unwrap();
        assert_eq!(
            dispatcher.calls().await[0].env["DOCKER_HOST"],
            "unix:///run/docker.sock"
        );
    }

    #[test]
    fn test_command_for_is_deterministic() {
        let spec = ToolSpec::text(schema(), build_echo);
        let a = spec.command_for(json!({"message": "same"})).unwrap();
        let b = spec.command_for(json!({"message": "same"})).unwrap();
        assert_eq!(a, b);
    }
}
