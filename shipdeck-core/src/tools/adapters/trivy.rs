//! trivy: vulnerability, misconfiguration and secret scanning

use serde::Deserialize;
use serde_json::Value;

use crate::Result;
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::normalize::{Envelope, count_severities};
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};
use crate::Error;

const SEVERITIES: &[&str] = &["UNKNOWN", "LOW", "MEDIUM", "HIGH", "CRITICAL"];
const SCAN_FORMATS: &[&str] = &[
    "table",
    "json",
    "sarif",
    "template",
    "cyclonedx",
    "spdx",
    "spdx-json",
];
const SBOM_FORMATS: &[&str] = &["cyclonedx", "spdx", "spdx-json"];

/// Subset of `trivy --format json` output used for summaries
#[derive(Debug, Deserialize)]
pub struct TrivyReport {
    #[serde(rename = "Results", default)]
    pub results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
pub struct TrivyResult {
    #[serde(rename = "Target", default)]
    pub target: String,
    #[serde(rename = "Vulnerabilities", default)]
    pub vulnerabilities: Vec<TrivyFinding>,
    #[serde(rename = "Misconfigurations", default)]
    pub misconfigurations: Vec<TrivyFinding>,
    #[serde(rename = "Secrets", default)]
    pub secrets: Vec<TrivyFinding>,
}

#[derive(Debug, Deserialize)]
pub struct TrivyFinding {
    #[serde(rename = "Severity", default)]
    pub severity: String,
}

fn severity() -> ParamSpec {
    ParamSpec::string("severity", "Severity to report").one_of(SEVERITIES)
}

fn output_format(values: &[&str]) -> ParamSpec {
    ParamSpec::string("output_format", "Output format").one_of(values)
}

fn scanners() -> ParamSpec {
    ParamSpec::string(
        "scanners",
        "Comma-separated scanners to use (vuln,misconfig,secret,license)",
    )
}

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::envelope(
            ToolSchema::new(
                "trivy_scan",
                "Scan an image, filesystem, repository, config or SBOM with Trivy; return JSON output and severity counts",
            )
            .param(ParamSpec::string("target", "Target to scan").required())
            .param(
                ParamSpec::string("target_type", "Type of target")
                    .one_of(&["image", "fs", "repo", "config", "sbom"])
                    .default_str("image"),
            )
            .param(ParamSpec::string(
                "severity",
                "Comma-separated severities to report (e.g. HIGH,CRITICAL)",
            )),
            "Trivy scan",
            scan,
            finish_scan,
        ),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_scan_image",
                "Scan container image for vulnerabilities using Trivy",
            )
            .param(
                ParamSpec::string("image_ref", "Container image reference (e.g. alpine:3.19)")
                    .required(),
            )
            .param(severity())
            .param(output_format(&[
                "table",
                "json",
                "sarif",
                "template",
                "cyclonedx",
                "spdx",
                "spdx-json",
                "github",
                "cosign-vuln",
            ]))
            .param(ParamSpec::string("output_file", "Write the report to this file"))
            .param(scanners())
            .param(ParamSpec::boolean(
                "ignore_unfixed",
                "Ignore unfixed vulnerabilities",
            )),
            |req| {
                Ok(common(ArgVector::new("trivy").arg("image"), req)
                    .opt("--output", req.get_str("output_file"))
                    .flag_if(req.flag("ignore_unfixed"), "--ignore-unfixed")
                    .arg(req.require("image_ref")?))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_scan_filesystem",
                "Scan filesystem for vulnerabilities using Trivy",
            )
            .param(ParamSpec::string("directory", "Directory to scan").default_str("."))
            .param(severity())
            .param(output_format(SCAN_FORMATS))
            .param(scanners())
            .param(ParamSpec::string(
                "skip_dirs",
                "Comma-separated directories to skip",
            ))
            .param(ParamSpec::boolean(
                "include_dev_deps",
                "Include development dependencies",
            )),
            |req| {
                Ok(common(ArgVector::new("trivy").arg("fs"), req)
                    .repeat("--skip-dirs", &req.list("skip_dirs"))
                    .flag_if(req.flag("include_dev_deps"), "--include-dev-deps")
                    .arg(req.str_or("directory", ".")))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_scan_repository",
                "Scan git repository for vulnerabilities using Trivy",
            )
            .param(ParamSpec::string("repo_url", "Repository URL").required())
            .param(ParamSpec::string("branch", "Branch to scan"))
            .param(ParamSpec::string("commit", "Commit to scan"))
            .param(severity())
            .param(output_format(SCAN_FORMATS))
            .param(scanners()),
            |req| {
                Ok(common(ArgVector::new("trivy").arg("repo"), req)
                    .opt("--branch", req.get_str("branch"))
                    .opt("--commit", req.get_str("commit"))
                    .arg(req.require("repo_url")?))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_scan_config",
                "Scan configuration files for security issues using Trivy",
            )
            .param(ParamSpec::string("directory", "Directory to scan").default_str("."))
            .param(severity())
            .param(output_format(&["table", "json", "sarif", "template"]))
            .param(ParamSpec::string(
                "policy_bundle",
                "OCI repository of the checks bundle",
            ))
            .param(ParamSpec::string(
                "config_policy",
                "Path to custom Rego checks",
            )),
            |req| {
                Ok(common(ArgVector::new("trivy").arg("config"), req)
                    .opt("--checks-bundle-repository", req.get_str("policy_bundle"))
                    .opt("--config-check", req.get_str("config_policy"))
                    .arg(req.str_or("directory", ".")))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new("trivy_scan_sbom", "Scan SBOM file for vulnerabilities using Trivy")
                .param(ParamSpec::string("sbom_path", "SBOM file to scan").required())
                .param(severity())
                .param(output_format(SCAN_FORMATS))
                .param(ParamSpec::string("output_file", "Write the report to this file"))
                .param(ParamSpec::boolean(
                    "ignore_unfixed",
                    "Ignore unfixed vulnerabilities",
                )),
            |req| {
                Ok(common(ArgVector::new("trivy").arg("sbom"), req)
                    .opt("--output", req.get_str("output_file"))
                    .flag_if(req.flag("ignore_unfixed"), "--ignore-unfixed")
                    .arg(req.require("sbom_path")?))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_scan_kubernetes",
                "Scan Kubernetes cluster for vulnerabilities using Trivy",
            )
            .param(
                ParamSpec::string("target", "What to scan")
                    .one_of(&["cluster", "all", "workload", "node"])
                    .default_str("cluster"),
            )
            .param(ParamSpec::string("cluster_context", "Kubeconfig context"))
            .param(ParamSpec::string("namespace", "Namespace to scan"))
            .param(severity())
            .param(output_format(&["table", "json", "sarif"]))
            .param(scanners())
            .param(ParamSpec::boolean(
                "include_images",
                "Also scan workload images",
            )),
            |req| {
                let mut argv = common(ArgVector::new("trivy").arg("k8s"), req)
                    .opt("--context", req.get_str("cluster_context"))
                    .opt("--include-namespaces", req.get_str("namespace"));
                if !req.flag("include_images") {
                    argv = argv.arg("--disable-node-collector");
                }
                Ok(argv.arg("--report").arg("summary").arg(req.str_or("target", "cluster")))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_generate_sbom",
                "Generate Software Bill of Materials (SBOM) using Trivy",
            )
            .param(ParamSpec::string("target", "Target to inventory").required())
            .param(
                ParamSpec::string("target_type", "Type of target")
                    .one_of(&["image", "fs", "repo"])
                    .required(),
            )
            .param(
                ParamSpec::string("sbom_format", "SBOM format")
                    .one_of(SBOM_FORMATS)
                    .required(),
            )
            .param(ParamSpec::string("output_file", "Write the SBOM to this file"))
            .param(ParamSpec::boolean(
                "include_dev_deps",
                "Include development dependencies",
            )),
            |req| {
                let target_type = req.require("target_type")?;
                let sbom_format = req.require("sbom_format")?;
                Ok(ArgVector::new("trivy")
                    .arg(target_type)
                    .arg("--format")
                    .arg(sbom_format)
                    .opt("--output", req.get_str("output_file"))
                    .flag_if(req.flag("include_dev_deps"), "--include-dev-deps")
                    .arg(req.require("target")?))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_scan_with_filters",
                "Scan with advanced filtering options using Trivy",
            )
            .param(ParamSpec::string("target", "Target to scan").required())
            .param(
                ParamSpec::string("target_type", "Type of target")
                    .one_of(&["image", "fs", "repo", "config"])
                    .required(),
            )
            .param(ParamSpec::string("severity", "Comma-separated severity levels"))
            .param(ParamSpec::string(
                "vuln_type",
                "Comma-separated package types: os,library",
            ))
            .param(ParamSpec::string("ignore_file", "Path to .trivyignore file"))
            .param(ParamSpec::boolean(
                "ignore_unfixed",
                "Ignore unfixed vulnerabilities",
            ))
            .param(ParamSpec::string(
                "exit_code",
                "Exit code when vulnerabilities are found",
            )),
            |req| {
                let target_type = req.require("target_type")?;
                let target = req.require("target")?;
                if let Some(code) = req.get_str("exit_code")
                    && code.parse::<u8>().is_err()
                {
                    return Err(Error::invalid("exit_code", "expected an integer 0-255"));
                }
                Ok(ArgVector::new("trivy")
                    .arg(target_type)
                    .opt("--severity", req.get_str("severity"))
                    .opt("--pkg-types", req.get_str("vuln_type"))
                    .opt("--ignorefile", req.get_str("ignore_file"))
                    .flag_if(req.flag("ignore_unfixed"), "--ignore-unfixed")
                    .opt("--exit-code", req.get_str("exit_code"))
                    .arg(target))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_database_operations",
                "Perform Trivy vulnerability database operations",
            )
            .param(
                ParamSpec::string("operation", "Database operation")
                    .one_of(&["download", "update", "reset", "clean"])
                    .required(),
            )
            .param(ParamSpec::boolean(
                "skip_update",
                "Skip the database update on download",
            ))
            .param(ParamSpec::string("cache_dir", "Cache directory")),
            database_operations,
        ),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_client_scan",
                "Scan using Trivy client mode (connect to Trivy server)",
            )
            .param(ParamSpec::string("target", "Target to scan").required())
            .param(
                ParamSpec::string("target_type", "Type of target")
                    .one_of(&["image", "fs", "repo"])
                    .required(),
            )
            .param(ParamSpec::string("server_url", "Trivy server URL").required())
            .param(ParamSpec::string("token", "Server authentication token"))
            .param(output_format(&["table", "json", "sarif"])),
            |req| {
                let target_type = req.require("target_type")?;
                let target = req.require("target")?;
                Ok(ArgVector::new("trivy")
                    .arg(target_type)
                    .arg("--server")
                    .arg(req.require("server_url")?)
                    .opt("--token", req.get_str("token"))
                    .opt("--format", req.get_str("output_format"))
                    .arg(target))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_plugin_management",
                "Manage Trivy plugins for extended functionality",
            )
            .param(
                ParamSpec::string("action", "Plugin action")
                    .one_of(&["list", "install", "uninstall", "upgrade", "info"])
                    .required(),
            )
            .param(ParamSpec::string(
                "plugin_name",
                "Plugin name (required for install, uninstall, upgrade and info)",
            )),
            plugin_management,
        ),
        ToolSpec::text(
            ToolSchema::new(
                "trivy_convert_sbom",
                "Convert a Trivy JSON report to another format",
            )
            .param(ParamSpec::string("input_sbom", "Trivy JSON report to convert").required())
            .param(
                ParamSpec::string("output_format", "Target format")
                    .one_of(SBOM_FORMATS)
                    .required(),
            )
            .param(ParamSpec::string("output_file", "Write the result to this file")),
            |req| {
                let input = req.require("input_sbom")?;
                Ok(ArgVector::new("trivy")
                    .arg("convert")
                    .arg("--format")
                    .arg(req.require("output_format")?)
                    .opt("--output", req.get_str("output_file"))
                    .arg(input))
            },
        ),
        ToolSpec::text(
            ToolSchema::new("trivy_get_version", "Get Trivy version information"),
            |_| Ok(ArgVector::new("trivy").arg("--version")),
        ),
    ]
}

/// Flags shared by the scan subcommands; none are emitted when absent
fn common(argv: ArgVector, req: &ToolRequest) -> ArgVector {
    argv.opt("--severity", req.get_str("severity"))
        .opt("--format", req.get_str("output_format"))
        .opt("--scanners", req.get_str("scanners"))
}

fn scan(req: &ToolRequest) -> Result<ArgVector> {
    let target = req.require("target")?;
    Ok(ArgVector::new("trivy")
        .arg(req.str_or("target_type", "image"))
        .arg("--format")
        .arg("json")
        .arg("--quiet")
        .opt("--severity", req.get_str("severity"))
        .arg(target))
}

fn database_operations(req: &ToolRequest) -> Result<ArgVector> {
    let argv = ArgVector::new("trivy");
    let argv = match req.require("operation")? {
        "download" | "update" => argv
            .arg("image")
            .arg("--download-db-only")
            .flag_if(req.flag("skip_update"), "--skip-db-update"),
        "reset" => argv.arg("clean").arg("--all"),
        "clean" => argv.arg("clean").arg("--scan-cache"),
        other => return Err(Error::invalid("operation", format!("unsupported '{other}'"))),
    };
    Ok(argv.opt("--cache-dir", req.get_str("cache_dir")))
}

fn plugin_management(req: &ToolRequest) -> Result<ArgVector> {
    let action = req.require("action")?;
    let argv = ArgVector::new("trivy").arg("plugin").arg(action);
    match action {
        "list" => Ok(argv),
        _ => Ok(argv.arg(req.require("plugin_name")?)),
    }
}

fn finish_scan(_req: &ToolRequest, envelope: &mut Envelope) {
    let Ok(report) = serde_json::from_str::<TrivyReport>(&envelope.stdout) else {
        return;
    };
    let vulnerabilities = report
        .results
        .iter()
        .flat_map(|r| r.vulnerabilities.iter())
        .map(|f| f.severity.as_str());
    envelope.summary = count_severities(vulnerabilities);

    let misconfigurations: usize = report.results.iter().map(|r| r.misconfigurations.len()).sum();
    let secrets: usize = report.results.iter().map(|r| r.secrets.len()).sum();
    envelope
        .summary
        .insert("misconfigurations".into(), Value::from(misconfigurations));
    envelope.summary.insert("secrets".into(), Value::from(secrets));
    envelope
        .summary
        .insert("targets".into(), Value::from(report.results.len()));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::dispatch::ExecOutput;
    use crate::tools::adapters::testing::{argv_of, build_error, find, request};
    use serde_json::json;

    #[test]
    fn test_scan_image_ends_with_ref_and_no_format() {
        let argv = argv_of(&tools(), "trivy_scan_image", json!({"image_ref": "alpine:3.19"}));
        assert_eq!(argv.last().unwrap(), "alpine:3.19");
        assert!(!argv.iter().any(|a| a == "--format"));
        assert_eq!(argv, vec!["trivy", "image", "alpine:3.19"]);
    }

    #[test]
    fn test_scan_image_all_options() {
        let argv = argv_of(
            &tools(),
            "trivy_scan_image",
            json!({
                "image_ref": "nginx:1.25",
                "severity": "CRITICAL",
                "output_format": "json",
                "output_file": "report.json",
                "scanners": "vuln,secret",
                "ignore_unfixed": true
            }),
        );
        assert_eq!(
            argv,
            vec![
                "trivy",
                "image",
                "--severity",
                "CRITICAL",
                "--format",
                "json",
                "--scanners",
                "vuln,secret",
                "--output",
                "report.json",
                "--ignore-unfixed",
                "nginx:1.25"
            ]
        );
    }

    #[test]
    fn test_filesystem_default_directory() {
        assert_eq!(
            argv_of(&tools(), "trivy_scan_filesystem", json!({"skip_dirs": "node_modules,target"})),
            vec![
                "trivy",
                "fs",
                "--skip-dirs",
                "node_modules",
                "--skip-dirs",
                "target",
                "."
            ]
        );
    }

    #[test]
    fn test_kubernetes_default_target() {
        let argv = argv_of(&tools(), "trivy_scan_kubernetes", json!({}));
        assert_eq!(argv.last().unwrap(), "cluster");
        assert_eq!(argv[1], "k8s");
    }

    #[test]
    fn test_database_operations() {
        assert_eq!(
            argv_of(&tools(), "trivy_database_operations", json!({"operation": "update"})),
            vec!["trivy", "image", "--download-db-only"]
        );
        assert_eq!(
            argv_of(&tools(), "trivy_database_operations", json!({"operation": "reset"})),
            vec!["trivy", "clean", "--all"]
        );
        assert_eq!(
            argv_of(
                &tools(),
                "trivy_database_operations",
                json!({"operation": "clean", "cache_dir": "/cache"})
            ),
            vec!["trivy", "clean", "--scan-cache", "--cache-dir", "/cache"]
        );
    }

    #[test]
    fn test_plugin_name_conditionally_required() {
        assert_eq!(
            argv_of(&tools(), "trivy_plugin_management", json!({"action": "list"})),
            vec!["trivy", "plugin", "list"]
        );
        assert_eq!(
            build_error(&tools(), "trivy_plugin_management", json!({"action": "install"}))
                .to_string(),
            "plugin_name is required"
        );
    }

    #[test]
    fn test_generate_sbom_requires_all() {
        assert!(matches!(
            build_error(
                &tools(),
                "trivy_generate_sbom",
                json!({"target": "alpine", "target_type": "image"})
            ),
            Error::MissingParameter(ref p) if p == "sbom_format"
        ));
    }

    #[test]
    fn test_filters_reject_bad_exit_code() {
        let err = build_error(
            &tools(),
            "trivy_scan_with_filters",
            json!({"target": ".", "target_type": "fs", "exit_code": "many"}),
        );
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_scan_envelope_argv_and_summary() {
        let specs = tools();
        assert_eq!(
            argv_of(&specs, "trivy_scan", json!({"target": "alpine:3.19"})),
            vec!["trivy", "image", "--format", "json", "--quiet", "alpine:3.19"]
        );

        let req = request(find(&specs, "trivy_scan"), json!({"target": "."}));
        let stdout = json!({
            "Results": [
                {"Target": "go.sum", "Vulnerabilities": [
                    {"Severity": "CRITICAL"}, {"Severity": "HIGH"}, {"Severity": "HIGH"}
                ]},
                {"Target": "Dockerfile", "Misconfigurations": [{"Severity": "MEDIUM"}]}
            ]
        })
        .to_string();
        let mut envelope = Envelope::ok(&ExecOutput {
            stdout,
            ..Default::default()
        });
        finish_scan(&req, &mut envelope);
        assert_eq!(envelope.summary["critical"], 1);
        assert_eq!(envelope.summary["high"], 2);
        assert_eq!(envelope.summary["misconfigurations"], 1);
        assert_eq!(envelope.summary["targets"], 2);
    }
}
