//! syft: SBOM generation

use serde_json::Value;

use crate::{Error, Result};
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::normalize::Envelope;
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};

const SBOM_FORMATS: &[&str] = &[
    "json",
    "table",
    "text",
    "cyclonedx-json",
    "cyclonedx-xml",
    "spdx-json",
    "spdx-tag-value",
    "github-json",
    "syft-table",
];

const PACKAGE_TYPES: &[&str] = &[
    "npm", "yarn", "pip", "python", "go", "maven", "gradle", "gem", "cargo",
];

/// syft cataloger tag covering a package ecosystem
fn cataloger(package_type: &str) -> Option<&'static str> {
    match package_type {
        "npm" | "yarn" => Some("javascript"),
        "pip" | "python" => Some("python"),
        "go" => Some("go"),
        "maven" | "gradle" => Some("java"),
        "gem" => Some("ruby"),
        "cargo" => Some("rust"),
        _ => None,
    }
}

const SCHEMES: &[&str] = &[
    "dir:",
    "file:",
    "docker:",
    "podman:",
    "registry:",
    "docker-archive:",
    "oci-archive:",
    "oci-dir:",
];

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::envelope(
            ToolSchema::new(
                "syft_sbom",
                "Generate CycloneDX or SPDX SBOM from a directory, image, or archive",
            )
            .param(
                ParamSpec::string(
                    "target",
                    "Target to scan (e.g., dir:., docker:alpine:3.19, oci-archive:/path/image.tar); a bare path is scanned as a directory",
                )
                .required(),
            )
            .param(
                ParamSpec::string("format", "SBOM format")
                    .one_of(&["cyclonedx-json", "spdx-json"])
                    .default_str("cyclonedx-json"),
            )
            .param(ParamSpec::string(
                "output_path",
                "Where to write SBOM (default: ./sbom.cdx.json or ./sbom.spdx.json based on format)",
            )),
            "Syft SBOM generation",
            sbom,
            finish_sbom,
        ),
        ToolSpec::text(
            ToolSchema::new(
                "syft_generate_sbom_directory",
                "Generate SBOM from a directory",
            )
            .param(ParamSpec::string("directory", "Directory to scan").required())
            .param(
                ParamSpec::string("format", "Output format")
                    .one_of(SBOM_FORMATS)
                    .default_str("json"),
            ),
            |req| {
                Ok(ArgVector::new("syft")
                    .arg("scan")
                    .arg(format!("dir:{}", req.require("directory")?))
                    .arg("-o")
                    .arg(req.str_or("format", "json")))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "syft_generate_sbom_image",
                "Generate SBOM from a container image",
            )
            .param(ParamSpec::string("image", "Container image reference").required())
            .param(
                ParamSpec::string("format", "Output format")
                    .one_of(SBOM_FORMATS)
                    .default_str("json"),
            ),
            |req| {
                Ok(ArgVector::new("syft")
                    .arg("scan")
                    .arg(req.require("image")?)
                    .arg("-o")
                    .arg(req.str_or("format", "json")))
            },
        ),
        ToolSpec::text(
            ToolSchema::new(
                "syft_generate_sbom_package",
                "Generate SBOM for one package ecosystem in a directory",
            )
            .param(ParamSpec::string("directory", "Directory containing packages").required())
            .param(
                ParamSpec::string("package_type", "Package ecosystem")
                    .one_of(PACKAGE_TYPES)
                    .required(),
            )
            .param(
                ParamSpec::string("format", "Output format")
                    .one_of(SBOM_FORMATS)
                    .default_str("json"),
            ),
            package_sbom,
        ),
        ToolSpec::text(
            ToolSchema::new("syft_convert_sbom", "Convert an SBOM between formats")
                .param(ParamSpec::string("input_sbom", "SBOM file to convert").required())
                .param(
                    ParamSpec::string("output_format", "Target format")
                        .one_of(SBOM_FORMATS)
                        .required(),
                ),
            |req| {
                Ok(ArgVector::new("syft")
                    .arg("convert")
                    .arg(req.require("input_sbom")?)
                    .arg("-o")
                    .arg(req.require("output_format")?))
            },
        ),
        ToolSpec::text(
            ToolSchema::new("syft_version", "Display Syft version information"),
            |_| Ok(ArgVector::new("syft").arg("version")),
        ),
    ]
}

fn package_sbom(req: &ToolRequest) -> Result<ArgVector> {
    let directory = req.require("directory")?;
    let package_type = req.require("package_type")?;
    let tag = cataloger(package_type).ok_or_else(|| {
        Error::invalid("package_type", format!("unsupported '{package_type}'"))
    })?;
    Ok(ArgVector::new("syft")
        .arg("scan")
        .arg(format!("dir:{directory}"))
        .arg("-o")
        .arg(req.str_or("format", "json"))
        .arg("--select-catalogers")
        .arg(tag))
}

fn default_output_path(format: &str) -> &'static str {
    if format == "spdx-json" {
        "./sbom.spdx.json"
    } else {
        "./sbom.cdx.json"
    }
}

fn source(target: &str) -> String {
    if SCHEMES.iter().any(|scheme| target.starts_with(scheme)) {
        target.to_string()
    } else {
        format!("dir:{target}")
    }
}

fn sbom(req: &ToolRequest) -> Result<ArgVector> {
    let target = req.require("target")?;
    let format = req.str_or("format", "cyclonedx-json");
    let output_path = req.str_or("output_path", default_output_path(format));
    Ok(ArgVector::new("syft")
        .arg("scan")
        .arg(source(target))
        .arg("-o")
        .arg(format)
        .arg("-o")
        .arg(format!("{format}={output_path}")))
}

fn finish_sbom(req: &ToolRequest, envelope: &mut Envelope) {
    let format = req.str_or("format", "cyclonedx-json");
    let output_path = req.str_or("output_path", default_output_path(format));
    let key = if format == "spdx-json" {
        "sbom_spdx"
    } else {
        "sbom_cyclonedx"
    };
    envelope.artifacts.insert(key.into(), output_path.into());

    let Ok(document) = serde_json::from_str::<Value>(&envelope.stdout) else {
        return;
    };
    // CycloneDX lists components, SPDX lists packages
    let list_key = if format == "spdx-json" {
        "packages"
    } else {
        "components"
    };
    if let Some(items) = document.get(list_key).and_then(Value::as_array) {
        envelope
            .summary
            .insert(list_key.into(), Value::from(items.len()));
    }
}
