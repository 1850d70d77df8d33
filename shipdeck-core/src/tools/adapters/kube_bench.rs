//! kube-bench: CIS Kubernetes benchmark checks

use crate::Result;
use crate::tools::argv::ArgVector;
use crate::tools::cli_tool::ToolSpec;
use crate::tools::request::ToolRequest;
use crate::tools::schema::{ParamSpec, ToolSchema};

const BENCHMARKS: &[&str] = &[
    "gke-1.0",
    "gke-1.2.0",
    "gke-1.6.0",
    "ack-1.0",
    "tkgi-1.2.53",
    "rke-cis-1.7",
    "rke2-cis-1.7",
    "k3s-cis-1.7",
    "rh-0.7",
    "rh-1.0",
];

fn kubeconfig() -> ParamSpec {
    ParamSpec::string("kubeconfig", "Path to kubeconfig file")
}

fn targets() -> ParamSpec {
    ParamSpec::string(
        "targets",
        "Comma-delimited list of targets to run (master, node, etcd, controlplane, policies)",
    )
}

fn benchmark() -> ParamSpec {
    ParamSpec::string("benchmark", "Manually specify CIS benchmark version").one_of(BENCHMARKS)
}

/// `kube-bench run` with the kubeconfig exported and the common selectors
fn run(req: &ToolRequest) -> ArgVector {
    ArgVector::new("kube-bench")
        .arg("run")
        .env("KUBECONFIG", req.get_str("kubeconfig"))
        .opt("--targets", req.get_str("targets"))
        .opt("--benchmark", req.get_str("benchmark"))
}

pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::text(
            ToolSchema::new("kube_bench_run", "Run CIS Kubernetes benchmark using kube-bench")
                .param(targets())
                .param(benchmark())
                .param(ParamSpec::string("version", "Manually specify Kubernetes version"))
                .param(ParamSpec::string("config_dir", "Config directory"))
                .param(ParamSpec::string("config", "Config file path"))
                .param(ParamSpec::boolean("json", "Output results in JSON format"))
                .param(ParamSpec::boolean("junit", "Output results in JUnit format"))
                .param(ParamSpec::string(
                    "outputfile",
                    "Write results to output file when using JSON or JUnit",
                ))
                .param(kubeconfig()),
            |req| {
                Ok(run(req)
                    .opt("--version", req.get_str("version"))
                    .opt("--config-dir", req.get_str("config_dir"))
                    .opt("--config", req.get_str("config"))
                    .flag_if(req.flag("json"), "--json")
                    .flag_if(req.flag("junit"), "--junit")
                    .opt("--outputfile", req.get_str("outputfile")))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "kube_bench_run_checks",
                "Run specific CIS benchmark checks using kube-bench",
            )
            .param(
                ParamSpec::string("checks", "Comma-delimited list of specific check IDs to run")
                    .required(),
            )
            .param(ParamSpec::string("benchmark", "Manually specify CIS benchmark version"))
            .param(ParamSpec::string("config_dir", "Config directory"))
            .param(ParamSpec::boolean("json", "Output results in JSON format"))
            .param(ParamSpec::string("outputfile", "Write results to output file"))
            .param(kubeconfig()),
            |req| {
                let checks = req.require("checks")?;
                Ok(run(req)
                    .arg("--check")
                    .arg(checks)
                    .opt("--config-dir", req.get_str("config_dir"))
                    .flag_if(req.flag("json"), "--json")
                    .opt("--outputfile", req.get_str("outputfile")))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "kube_bench_run_skip",
                "Run CIS benchmark with skipped checks using kube-bench",
            )
            .param(
                ParamSpec::string("skip", "Comma-delimited list of check IDs to skip").required(),
            )
            .param(targets())
            .param(ParamSpec::string("benchmark", "Manually specify CIS benchmark version"))
            .param(ParamSpec::boolean("json", "Output results in JSON format"))
            .param(ParamSpec::string("outputfile", "Write results to output file"))
            .param(kubeconfig()),
            |req| {
                let skip = req.require("skip")?;
                Ok(run(req)
                    .arg("--skip")
                    .arg(skip)
                    .flag_if(req.flag("json"), "--json")
                    .opt("--outputfile", req.get_str("outputfile")))
            },
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new(
                "kube_bench_run_custom_output",
                "Run CIS benchmark with custom output format using kube-bench",
            )
            .param(
                ParamSpec::string("output_format", "Output format")
                    .one_of(&["json", "junit", "text", "asff"])
                    .required(),
            )
            .param(ParamSpec::string("outputfile", "Write results to output file"))
            .param(targets())
            .param(ParamSpec::string("benchmark", "Manually specify CIS benchmark version"))
            .param(kubeconfig()),
            custom_output,
        )
        .findings(),
        ToolSpec::text(
            ToolSchema::new("kube_bench_version", "Get kube-bench version"),
            |_| Ok(ArgVector::new("kube-bench").arg("version")),
        ),
    ]
}

fn custom_output(req: &ToolRequest) -> Result<ArgVector> {
    let argv = match req.require("output_format")? {
        // plain text is kube-bench's default report
        "text" => run(req),
        format => run(req).arg(format!("--{format}")),
    };
    Ok(argv.opt("--outputfile", req.get_str("outputfile")))
}
