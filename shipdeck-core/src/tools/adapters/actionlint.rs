//! actionlint: GitHub Actions workflow linter

use crate::Result;
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};

const DEFAULT_FORMAT: &str = "{{json .}}";

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::text(
            ToolSchema::new(
                "actionlint_scan_workflows",
                "Lint GitHub Actions workflow files with actionlint",
            )
            .param(ParamSpec::string(
                "workflow_files",
                "Comma-separated workflow files (default: all workflows in .github/workflows)",
            ))
            .param(
                ParamSpec::string("format_template", "Go template for the report format")
                    .default_str(DEFAULT_FORMAT),
            )
            .param(ParamSpec::string(
                "ignore_patterns",
                "Comma-separated regular expressions of errors to ignore",
            ))
            .param(ParamSpec::boolean("color", "Colorize output")),
            scan_workflows,
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "actionlint_scan_with_external_tools",
                "Lint workflows with shellcheck and pyflakes integration",
            )
            .param(ParamSpec::string(
                "workflow_files",
                "Comma-separated workflow files",
            ))
            .param(ParamSpec::string(
                "shellcheck_path",
                "Path to the shellcheck executable (empty disables it)",
            ))
            .param(ParamSpec::string(
                "pyflakes_path",
                "Path to the pyflakes executable (empty disables it)",
            ))
            .param(ParamSpec::boolean("color", "Colorize output")),
            scan_with_external_tools,
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new("actionlint_get_version", "Print the actionlint version"),
            |_| Ok(ArgVector::new("actionlint").arg("-version")),
        ),
    ]
}

fn scan_workflows(req: &ToolRequest) -> Result<ArgVector> {
    Ok(ArgVector::new("actionlint")
        .arg("-format")
        .arg(req.str_or("format_template", DEFAULT_FORMAT))
        .repeat("-ignore", &req.list("ignore_patterns"))
        .flag_if(req.flag("color"), "-color")
        .args(req.list("workflow_files")))
}

fn scan_with_external_tools(req: &ToolRequest) -> Result<ArgVector> {
    Ok(ArgVector::new("actionlint")
        .opt("-shellcheck", req.get_str("shellcheck_path"))
        .opt("-pyflakes", req.get_str("pyflakes_path"))
        .flag_if(req.flag("color"), "-color")
        .args(req.list("workflow_files")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tools::adapters::testing::argv_of;
    use serde_json::json;

    #[test]
    fn test_scan_defaults() {
        assert_eq!(
            argv_of(&tools(), "actionlint_scan_workflows", json!({})),
            vec!["actionlint", "-format", "{{json .}}"]
        );
    }

    #[test]
    fn test_scan_with_files_and_ignores() {
        let argv = argv_of(
            &tools(),
            "actionlint_scan_workflows",
            json!({
                "workflow_files": ".github/workflows/ci.yml,.github/workflows/release.yml",
                "ignore_patterns": "SC2086, label .+ is unknown",
                "color": true
            }),
        );
        assert_eq!(
            argv,
            vec![
                "actionlint",
                "-format",
                "{{json .}}",
                "-ignore",
                "SC2086",
                "-ignore",
                "label .+ is unknown",
                "-color",
                ".github/workflows/ci.yml",
                ".github/workflows/release.yml"
            ]
        );
    }

    #[test]
    fn test_external_tools() {
        let argv = argv_of(
            &tools(),
            "actionlint_scan_with_external_tools",
            json!({"shellcheck_path": "/usr/bin/shellcheck"}),
        );
        assert_eq!(argv, vec!["actionlint", "-shellcheck", "/usr/bin/shellcheck"]);
    }

    #[test]
    fn test_version() {
        assert_eq!(
            argv_of(&tools(), "actionlint_get_version", json!({})),
            vec!["actionlint", "-version"]
        );
    }
}
