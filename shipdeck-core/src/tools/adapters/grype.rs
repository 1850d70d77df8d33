//! grype: vulnerability scanning of images, directories and SBOMs

use serde::Deserialize;
use serde_json::Value;

use crate::Result;
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::normalize::{Envelope, count_severities, severity_rank};
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};

const SEVERITIES: &[&str] = &["negligible", "low", "medium", "high", "critical"];

/// Grype source schemes passed through untouched
const SCHEMES: &[&str] = &[
    "sbom:",
    "dir:",
    "file:",
    "docker:",
    "podman:",
    "docker-archive:",
    "oci-archive:",
    "oci-dir:",
    "registry:",
];

#[derive(Debug, Deserialize)]
pub struct GrypeOutput {
    #[serde(default)]
    pub matches: Vec<GrypeMatch>,
}

#[derive(Debug, Deserialize)]
pub struct GrypeMatch {
    pub vulnerability: GrypeVulnerability,
}

#[derive(Debug, Deserialize)]
pub struct GrypeVulnerability {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub severity: String,
}

impl GrypeOutput {
    /// Parse Grype JSON output
    pub fn parse(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::envelope(
            ToolSchema::new(
                "grype_scan",
                "Vulnerability scan from a SBOM (preferred) or direct target; return JSON/SARIF paths and structured counts",
            )
            .param(
                ParamSpec::string(
                    "input",
                    "Input source (e.g., sbom:/abs/sbom.json, dir:., docker:alpine:3.19); a bare path is read as an SBOM",
                )
                .required(),
            )
            .param(
                ParamSpec::string("format", "Output format")
                    .one_of(&["json", "sarif"])
                    .default_str("json"),
            )
            .param(
                ParamSpec::string(
                    "min_severity",
                    "Minimum severity counted in the summary rollup",
                )
                .one_of(SEVERITIES),
            ),
            "Grype scan",
            scan,
            finish_scan,
        ),
        ToolSpec::text(
            ToolSchema::new(
                "grype_scan_target",
                "Scan a container image, directory, archive or SBOM for vulnerabilities",
            )
            .param(
                ParamSpec::string(
                    "target",
                    "Target to scan (container image, directory, archive, or SBOM)",
                )
                .required(),
            )
            .param(
                ParamSpec::string("output", "Report output format")
                    .one_of(&["table", "json", "cyclonedx", "sarif", "template"]),
            )
            .param(
                ParamSpec::string("fail_on", "Exit with error on specified severity or higher")
                    .one_of(SEVERITIES),
            )
            .param(ParamSpec::boolean(
                "only_fixed",
                "Show only vulnerabilities with confirmed fixes",
            ))
            .param(ParamSpec::boolean(
                "only_notfixed",
                "Show only vulnerabilities without confirmed fixes",
            ))
            .param(ParamSpec::string(
                "exclude",
                "Exclude specific file path from scanning",
            ))
            .param(
                ParamSpec::string("scope", "Scope for image layer scanning")
                    .one_of(&["all-layers", "squashed"]),
            )
            .param(ParamSpec::boolean(
                "add_cpes_if_none",
                "Generate CPE information if missing from SBOM",
            ))
            .param(ParamSpec::string(
                "distro",
                "Specify distribution (format: <distro>:<version>)",
            )),
            scan_target,
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "grype_db_status",
                "Report current status of Grype's vulnerability database",
            ),
            |_| Ok(ArgVector::new("grype").args(["db", "status"])),
        ),
        ToolSpec::text(
            ToolSchema::new(
                "grype_db_check",
                "Check if updates are available for the vulnerability database",
            ),
            |_| Ok(ArgVector::new("grype").args(["db", "check"])),
        ),
        ToolSpec::text(
            ToolSchema::new(
                "grype_db_update",
                "Update the vulnerability database to the latest version",
            ),
            |_| Ok(ArgVector::new("grype").args(["db", "update"])),
        ),
        ToolSpec::text(
            ToolSchema::new("grype_db_list", "Show databases available for download"),
            |_| Ok(ArgVector::new("grype").args(["db", "list"])),
        ),
        ToolSpec::text(
            ToolSchema::new("grype_db_import", "Import a vulnerability database archive")
                .param(
                    ParamSpec::string("archive_path", "Path to the database archive")
                        .required(),
                ),
            |req| {
                Ok(ArgVector::new("grype")
                    .args(["db", "import"])
                    .arg(req.require("archive_path")?))
            },
        ),
        ToolSpec::text(
            ToolSchema::new("grype_version", "Display Grype version information"),
            |_| Ok(ArgVector::new("grype").arg("version")),
        ),
    ]
}

/// Normalize the scan input to a grype source string
fn source(input: &str) -> String {
    if SCHEMES.iter().any(|scheme| input.starts_with(scheme)) {
        input.to_string()
    } else {
        format!("sbom:{input}")
    }
}

fn scan(req: &ToolRequest) -> Result<ArgVector> {
    Ok(ArgVector::new("grype")
        .arg(source(req.require("input")?))
        .arg("-o")
        .arg(req.str_or("format", "json")))
}

fn scan_target(req: &ToolRequest) -> Result<ArgVector> {
    Ok(ArgVector::new("grype")
        .arg(req.require("target")?)
        .opt("-o", req.get_str("output"))
        .opt("--fail-on", req.get_str("fail_on"))
        .flag_if(req.flag("only_fixed"), "--only-fixed")
        .flag_if(req.flag("only_notfixed"), "--only-notfixed")
        .opt("--exclude", req.get_str("exclude"))
        .opt("--scope", req.get_str("scope"))
        .flag_if(req.flag("add_cpes_if_none"), "--add-cpes-if-none")
        .opt("--distro", req.get_str("distro")))
}

fn finish_scan(req: &ToolRequest, envelope: &mut Envelope) {
    let format = req.str_or("format", "json");
    if format == "sarif" {
        envelope
            .artifacts
            .insert("grype_sarif".into(), "./grype.sarif".into());
    } else {
        envelope
            .artifacts
            .insert("grype_json".into(), "./grype.json".into());
    }

    if format != "json" {
        return;
    }
    let Ok(parsed) = GrypeOutput::parse(&envelope.stdout) else {
        return;
    };

    let severities: Vec<&str> = parsed
        .matches
        .iter()
        .map(|m| m.vulnerability.severity.as_str())
        .collect();
    envelope.summary = count_severities(severities.iter().copied());

    if let Some(min) = req.get_str("min_severity") {
        let floor = severity_rank(min);
        let at_or_above = severities
            .iter()
            .filter(|s| severity_rank(s) >= floor)
            .count();
        envelope
            .summary
            .insert("min_severity".into(), Value::from(min));
        envelope
            .summary
            .insert("at_or_above_min_severity".into(), Value::from(at_or_above));
    }
}
