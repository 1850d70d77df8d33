//! OpenSCAP: SCAP content evaluation, reports and validation via `oscap`

use crate::Result;
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};

fn oscap() -> ArgVector {
    ArgVector::new("oscap")
}

pub fn tools() -> Vec<ToolSpec> {
    vec![
        // oscap exits 2 when at least one rule fails
        ToolSpec::text(
            ToolSchema::new(
                "openscap_xccdf_eval",
                "Evaluate XCCDF content against a system using OpenSCAP",
            )
            .param(ParamSpec::string("xccdf_file", "Path to XCCDF or datastream file").required())
            .param(ParamSpec::string("profile", "Profile ID to evaluate"))
            .param(ParamSpec::string("results_file", "Write XCCDF results to this file"))
            .param(ParamSpec::string("report_file", "Write an HTML report to this file"))
            .param(ParamSpec::string("cpe_file", "CPE dictionary or language file"))
            .param(ParamSpec::boolean(
                "fetch_remote_resources",
                "Download remote OVAL content referenced by the benchmark",
            )),
            xccdf_eval,
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new("openscap_oval_eval", "Evaluate OVAL definitions using OpenSCAP")
                .param(ParamSpec::string("oval_file", "Path to OVAL definitions file").required())
                .param(ParamSpec::string("results_file", "Write OVAL results to this file"))
                .param(ParamSpec::string("variables_file", "External variables file"))
                .param(ParamSpec::string(
                    "definition_id",
                    "Evaluate only this definition",
                )),
            |req| {
                let file = req.require("oval_file")?;
                Ok(oscap()
                    .args(["oval", "eval"])
                    .opt("--results", req.get_str("results_file"))
                    .opt("--variables", req.get_str("variables_file"))
                    .opt("--id", req.get_str("definition_id"))
                    .arg(file))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "openscap_xccdf_generate_report",
                "Generate an HTML report from XCCDF results",
            )
            .param(ParamSpec::string("results_file", "XCCDF results file").required())
            .param(ParamSpec::string("output_file", "Write the report to this file")),
            |req| {
                let results = req.require("results_file")?;
                Ok(oscap()
                    .args(["xccdf", "generate", "report"])
                    .opt("--output", req.get_str("output_file"))
                    .arg(results))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "openscap_xccdf_generate_guide",
                "Generate a security guide from XCCDF content",
            )
            .param(ParamSpec::string("xccdf_file", "Path to XCCDF or datastream file").required())
            .param(ParamSpec::string("profile", "Profile ID to document"))
            .param(ParamSpec::string("output_file", "Write the guide to this file")),
            |req| {
                let file = req.require("xccdf_file")?;
                Ok(oscap()
                    .args(["xccdf", "generate", "guide"])
                    .opt("--profile", req.get_str("profile"))
                    .opt("--output", req.get_str("output_file"))
                    .arg(file))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "openscap_ds_validate",
                "Validate a SCAP source datastream",
            )
            .param(ParamSpec::string("datastream_file", "Datastream file to validate").required()),
            |req| {
                Ok(oscap()
                    .args(["ds", "sds-validate"])
                    .arg(req.require("datastream_file")?))
            },
        ),
        ToolSpec::text(
            ToolSchema::new("openscap_validate", "Validate SCAP content against its schema")
                .param(ParamSpec::string("content_file", "Content file to validate").required())
                .param(
                    ParamSpec::string("content_type", "Kind of SCAP content")
                        .one_of(&["xccdf", "oval", "cpe", "cve"])
                        .default_str("xccdf"),
                )
                .param(ParamSpec::boolean(
                    "schematron",
                    "Also run Schematron validation",
                )),
            validate,
        ),
        ToolSpec::text(
            ToolSchema::new("openscap_info", "Display information about SCAP content")
                .param(ParamSpec::string("content_file", "SCAP content file").required()),
            |req| Ok(oscap().arg("info").arg(req.require("content_file")?)),
        ),
        ToolSpec::text(
            ToolSchema::new(
                "openscap_xccdf_remediate",
                "Apply remediation for failed rules from XCCDF results",
            )
            .param(ParamSpec::string("results_file", "XCCDF results file").required()),
            |req| {
                Ok(oscap()
                    .args(["xccdf", "remediate"])
                    .arg(req.require("results_file")?))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "openscap_oval_generate_report",
                "Generate an HTML report from OVAL results",
            )
            .param(ParamSpec::string("oval_results_file", "OVAL results file").required())
            .param(ParamSpec::string("output_file", "Write the report to this file")),
            |req| {
                let results = req.require("oval_results_file")?;
                Ok(oscap()
                    .args(["oval", "generate", "report"])
                    .opt("--output", req.get_str("output_file"))
                    .arg(results))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "openscap_ds_split",
                "Split a SCAP source datastream into its component files",
            )
            .param(ParamSpec::string("datastream_file", "Datastream file to split").required())
            .param(
                ParamSpec::string("output_dir", "Directory for the extracted files")
                    .default_str("."),
            ),
            |req| {
                let file = req.require("datastream_file")?;
                Ok(oscap()
                    .args(["ds", "sds-split"])
                    .arg(file)
                    .arg(req.str_or("output_dir", ".")))
            },
        ),
    ]
}

fn xccdf_eval(req: &ToolRequest) -> Result<ArgVector> {
    let file = req.require("xccdf_file")?;
    Ok(oscap()
        .args(["xccdf", "eval"])
        .opt("--profile", req.get_str("profile"))
        .opt("--results", req.get_str("results_file"))
        .opt("--report", req.get_str("report_file"))
        .opt("--cpe", req.get_str("cpe_file"))
        .flag_if(req.flag("fetch_remote_resources"), "--fetch-remote-resources")
        .arg(file))
}

fn validate(req: &ToolRequest) -> Result<ArgVector> {
    let file = req.require("content_file")?;
    Ok(oscap()
        .arg(req.str_or("content_type", "xccdf"))
        .arg("validate")
        .flag_if(req.flag("schematron"), "--schematron")
        .arg(file))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tools::adapters::testing::{argv_of, build_error};
    use serde_json::json;

    #[test]
    fn test_xccdf_eval_with_profile() {
        assert_eq!(
            argv_of(
                &tools(),
                "openscap_xccdf_eval",
                json!({
                    "xccdf_file": "ssg-rhel9-ds.xml",
                    "profile": "xccdf_org.ssgproject.content_profile_cis",
                    "results_file": "results.xml",
                    "fetch_remote_resources": true
                })
            ),
            vec![
                "oscap",
                "xccdf",
                "eval",
                "--profile",
                "xccdf_org.ssgproject.content_profile_cis",
                "--results",
                "results.xml",
                "--fetch-remote-resources",
                "ssg-rhel9-ds.xml"
            ]
        );
    }

    #[test]
    fn test_validate_defaults_to_xccdf() {
        assert_eq!(
            argv_of(&tools(), "openscap_validate", json!({"content_file": "bench.xml"})),
            vec!["oscap", "xccdf", "validate", "bench.xml"]
        );
        assert_eq!(
            argv_of(
                &tools(),
                "openscap_validate",
                json!({"content_file": "defs.xml", "content_type": "oval", "schematron": true})
            ),
            vec!["oscap", "oval", "validate", "--schematron", "defs.xml"]
        );
    }

    #[test]
    fn test_ds_split_default_dir() {
        assert_eq!(
            argv_of(&tools(), "openscap_ds_split", json!({"datastream_file": "ds.xml"})),
            vec!["oscap", "ds", "sds-split", "ds.xml", "."]
        );
    }

    #[test]
    fn test_required_files() {
        for (tool, param) in [
            ("openscap_xccdf_eval", "xccdf_file"),
            ("openscap_oval_eval", "oval_file"),
            ("openscap_info", "content_file"),
            ("openscap_xccdf_remediate", "results_file"),
            ("openscap_oval_generate_report", "oval_results_file"),
        ] {
            assert_eq!(
                build_error(&tools(), tool, json!({})).to_string(),
                format!("{param} is required")
            );
        }
    }
}
