//! conftest: OPA policy tests against structured configuration

use serde::Deserialize;
use serde_json::Value;

use crate::Result;
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::normalize::Envelope;
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};

const OUTPUTS: &[&str] = &["json", "table", "tap", "junit", "github"];
const PARSERS: &[&str] = &["yaml", "json", "toml", "hcl1", "hcl2", "dockerfile"];

/// One file's result in `conftest test --output json`
#[derive(Debug, Deserialize)]
pub struct ConftestResult {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub failures: Vec<Value>,
    #[serde(default)]
    pub warnings: Vec<Value>,
}

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::envelope(
            ToolSchema::new(
                "conftest_validate",
                "Validate YAML/JSON/TF/Dockerfile/etc. against OPA policies",
            )
            .param(
                ParamSpec::string(
                    "input",
                    "Config file/dir to validate (comma-separated for several)",
                )
                .required(),
            )
            .param(
                ParamSpec::string("policy", "OPA policy path or OCI reference")
                    .default_str("./policy"),
            )
            .param(ParamSpec::string("namespace", "OPA namespace to use").default_str("main"))
            .param(
                ParamSpec::string("format", "Output format")
                    .one_of(OUTPUTS)
                    .default_str("json"),
            ),
            "Conftest validation",
            validate,
            finish_validate,
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "conftest_test",
                "Test configuration files against OPA policies",
            )
            .param(
                ParamSpec::string(
                    "input_file",
                    "Path to configuration file or directory to test",
                )
                .required(),
            )
            .param(ParamSpec::string("policy", "Path to policy directory"))
            .param(ParamSpec::string("namespace", "Override default namespace"))
            .param(ParamSpec::boolean("all_namespaces", "Look in all namespaces"))
            .param(ParamSpec::string("output", "Output format").one_of(OUTPUTS))
            .param(ParamSpec::string("parser", "Parser to use for input files").one_of(PARSERS)),
            |req| {
                Ok(ArgVector::new("conftest")
                    .arg("test")
                    .opt("--policy", req.get_str("policy"))
                    .opt("--namespace", req.get_str("namespace"))
                    .flag_if(req.flag("all_namespaces"), "--all-namespaces")
                    .opt("--output", req.get_str("output"))
                    .opt("--parser", req.get_str("parser"))
                    .arg(req.require("input_file")?))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new("conftest_verify", "Run policy unit tests")
                .param(ParamSpec::string("policy", "Path to policy directory"))
                .param(ParamSpec::boolean(
                    "show_builtin_errors",
                    "Show parsing errors (recommended)",
                )),
            |req| {
                Ok(ArgVector::new("conftest")
                    .arg("verify")
                    .opt("--policy", req.get_str("policy"))
                    .flag_if(req.flag("show_builtin_errors"), "--show-builtin-errors"))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "conftest_parse",
                "Parse and print structured data from input files",
            )
            .param(ParamSpec::string("input_file", "File to parse").required())
            .param(ParamSpec::string("parser", "Parser to use").one_of(PARSERS)),
            |req| {
                Ok(ArgVector::new("conftest")
                    .arg("parse")
                    .opt("--parser", req.get_str("parser"))
                    .arg(req.require("input_file")?))
            },
        ),
        ToolSpec::text(
            ToolSchema::new("conftest_push", "Push OPA policy bundles to OCI registry")
                .param(
                    ParamSpec::string("registry_url", "OCI repository to push to").required(),
                )
                .param(ParamSpec::string(
                    "policy_dir",
                    "Directory containing policies (default: current directory)",
                ))
                .param(ParamSpec::string("tag", "Tag appended to the repository")),
            push,
        ),
        ToolSpec::text(
            ToolSchema::new("conftest_get_version", "Get Conftest version information"),
            |_| Ok(ArgVector::new("conftest").arg("--version")),
        ),
    ]
}

fn validate(req: &ToolRequest) -> Result<ArgVector> {
    req.require("input")?;
    Ok(ArgVector::new("conftest")
        .arg("test")
        .arg("--policy")
        .arg(req.str_or("policy", "./policy"))
        .arg("--namespace")
        .arg(req.str_or("namespace", "main"))
        .arg("--output")
        .arg(req.str_or("format", "json"))
        .args(req.list("input")))
}

fn push(req: &ToolRequest) -> Result<ArgVector> {
    let registry = req.require("registry_url")?;
    let reference = match req.get_str("tag") {
        Some(tag) => format!("{registry}:{tag}"),
        None => registry.to_string(),
    };
    Ok(ArgVector::new("conftest")
        .arg("push")
        .arg(reference)
        .arg_opt(req.get_str("policy_dir")))
}

fn finish_validate(req: &ToolRequest, envelope: &mut Envelope) {
    let format = req.str_or("format", "json");
    match format {
        "json" => {
            envelope
                .artifacts
                .insert("conftest_json".into(), "./conftest.json".into());
        }
        "junit" => {
            envelope
                .artifacts
                .insert("conftest_junit".into(), "./conftest.xml".into());
        }
        _ => {}
    }

    if format != "json" {
        return;
    }
    let Ok(results) = serde_json::from_str::<Vec<ConftestResult>>(&envelope.stdout) else {
        return;
    };
    let violations: usize = results.iter().map(|r| r.failures.len()).sum();
    let warnings: usize = results.iter().map(|r| r.warnings.len()).sum();
    envelope
        .summary
        .insert("violations".into(), Value::from(violations));
    envelope
        .summary
        .insert("warnings".into(), Value::from(warnings));
    envelope
        .summary
        .insert("files".into(), Value::from(results.len()));
}
