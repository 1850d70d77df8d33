//! Gatekeeper: OPA admission control managed through kubectl or helm

use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};
use crate::{Error, Result};

pub const DEFAULT_VERSION: &str = "v3.20.0";
const NAMESPACE: &str = "gatekeeper-system";
const CHART_REPO: &str = "https://open-policy-agent.github.io/gatekeeper/charts";

fn manifest_url(version: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/open-policy-agent/gatekeeper/{version}/deploy/gatekeeper.yaml"
    )
}

/// Release tag of the form `vX.Y.Z`
fn version(req: &ToolRequest) -> Result<&str> {
    let version = req.str_or("version", DEFAULT_VERSION);
    let valid = version.strip_prefix('v').is_some_and(|digits| {
        let parts: Vec<&str> = digits.split('.').collect();
        parts.len() == 3
            && parts
                .iter()
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
    });
    if valid {
        Ok(version)
    } else {
        Err(Error::invalid("version", "expected a release tag like v3.20.0"))
    }
}

fn install_params(schema: ToolSchema, verb: &str) -> ToolSchema {
    schema
        .param(
            ParamSpec::string(
                "version",
                "Gatekeeper version (default: v3.20.0)",
            )
            .default_str(DEFAULT_VERSION),
        )
        .param(ParamSpec::boolean(
            "use_helm",
            format!("Use Helm for {verb} instead of kubectl"),
        ))
}

fn kubectl() -> ArgVector {
    ArgVector::new("kubectl")
}

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::text(
            install_params(
                ToolSchema::new("gatekeeper_install", "Install Gatekeeper using kubectl"),
                "installation",
            ),
            install,
        ),
        ToolSpec::text(
            install_params(
                ToolSchema::new("gatekeeper_uninstall", "Uninstall Gatekeeper from cluster"),
                "uninstallation",
            ),
            uninstall,
        ),
        ToolSpec::text(
            ToolSchema::new(
                "gatekeeper_apply_constraint_template",
                "Apply Gatekeeper constraint template using kubectl",
            )
            .param(
                ParamSpec::string("template_file", "Path to constraint template YAML file")
                    .required(),
            ),
            |req| Ok(kubectl().args(["apply", "-f"]).arg(req.require("template_file")?)),
        ),
        ToolSpec::text(
            ToolSchema::new(
                "gatekeeper_apply_constraint",
                "Apply Gatekeeper constraint using kubectl",
            )
            .param(ParamSpec::string("constraint_file", "Path to constraint YAML file").required()),
            |req| Ok(kubectl().args(["apply", "-f"]).arg(req.require("constraint_file")?)),
        ),
        ToolSpec::text(
            ToolSchema::new(
                "gatekeeper_get_constraint_templates",
                "List Gatekeeper constraint templates",
            ),
            |_| Ok(kubectl().args(["get", "constrainttemplates", "-o", "wide"])),
        ),
        ToolSpec::text(
            ToolSchema::new("gatekeeper_get_constraints", "List Gatekeeper constraints")
                .param(
                    ParamSpec::string(
                        "constraint_type",
                        "Constraint kind to list (default: all constraints)",
                    )
                    .default_str("constraints"),
                ),
            |req| {
                Ok(kubectl()
                    .arg("get")
                    .arg(req.str_or("constraint_type", "constraints"))
                    .args(["-o", "wide"]))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "gatekeeper_get_status",
                "Get Gatekeeper installation status",
            ),
            |_| Ok(kubectl().args(["get", "pods", "-n", NAMESPACE, "-o", "wide"])),
        ),
    ]
}

fn install(req: &ToolRequest) -> Result<ArgVector> {
    let version = version(req)?;
    if req.flag("use_helm") {
        Ok(ArgVector::new("helm")
            .args(["install", "gatekeeper", "gatekeeper", "--repo", CHART_REPO])
            .arg("--version")
            .arg(version.trim_start_matches('v'))
            .args(["--namespace", NAMESPACE, "--create-namespace"]))
    } else {
        Ok(kubectl().args(["apply", "-f"]).arg(manifest_url(version)))
    }
}

fn uninstall(req: &ToolRequest) -> Result<ArgVector> {
    let version = version(req)?;
    if req.flag("use_helm") {
        Ok(ArgVector::new("helm").args(["uninstall", "gatekeeper", "--namespace", NAMESPACE]))
    } else {
        Ok(kubectl().args(["delete", "-f"]).arg(manifest_url(version)))
    }
}
