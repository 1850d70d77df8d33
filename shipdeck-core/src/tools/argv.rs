//! Deterministic command line assembly

use std::collections::BTreeMap;
use std::fmt;

use crate::dispatch::Invocation;

/// Ordered argument vector for one external program, plus per-call environment.
///
/// Every element is a single argv token; nothing is ever passed through a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ArgVector {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![program.into()],
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Positional argument, only when present
    pub fn arg_opt(self, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.arg(v),
            _ => self,
        }
    }

    /// `flag value`, only when the value is present
    pub fn opt(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.arg(flag).arg(v),
            _ => self,
        }
    }

    /// `flag=value`, only when the value is present
    pub fn opt_eq(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.arg(format!("{flag}={v}")),
            _ => self,
        }
    }

    pub fn flag_if(self, condition: bool, flag: &str) -> Self {
        if condition { self.arg(flag) } else { self }
    }

    /// `flag v` once per value
    pub fn repeat(mut self, flag: &str, values: &[&str]) -> Self {
        for value in values {
            self = self.arg(flag).arg(*value);
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.env.insert(key.into(), v.to_string());
        }
        self
    }

    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn into_vec(self) -> Vec<String> {
        self.args
    }

    /// Finish into an invocation; `base_env` is overridden by per-call variables
    pub fn into_invocation(self, tool: &str, base_env: &BTreeMap<String, String>) -> Invocation {
        let mut env = base_env.clone();
        env.extend(self.env);
        Invocation {
            tool: tool.to_string(),
            argv: self.args,
            env,
        }
    }
}

impl fmt::Display for ArgVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_conditional_flags() {
        let argv = ArgVector::new("trivy")
            .arg("image")
            .opt("--severity", Some("HIGH"))
            .opt("--format", None)
            .opt("--output", Some(""))
            .flag_if(true, "--ignore-unfixed")
            .flag_if(false, "--quiet")
            .arg("alpine:3.19");
        assert_eq!(
            argv.as_slice(),
            [
                "trivy",
                "image",
                "--severity",
                "HIGH",
                "--ignore-unfixed",
                "alpine:3.19"
            ]
        );
    }

    #[test]
    fn test_repeat_and_eq_forms() {
        let argv = ArgVector::new("actionlint")
            .repeat("-ignore", &["SC2086", "label"])
            .opt_eq("-o", Some("cyclonedx-json"));
        assert_eq!(
            argv.into_vec(),
            vec!["actionlint", "-ignore", "SC2086", "-ignore", "label", "-o=cyclonedx-json"]
        );
    }

    #[test]
    fn test_invocation_env_precedence() {
        let mut base = BTreeMap::new();
        base.insert("KUBECONFIG".to_string(), "/base".to_string());
        base.insert("HOME".to_string(), "/root".to_string());
        let inv = ArgVector::new("kube-bench")
            .env("KUBECONFIG", Some("/call"))
            .env("EMPTY", Some(""))
            .into_invocation("kube_bench_run", &base);
        assert_eq!(inv.tool, "kube_bench_run");
        assert_eq!(inv.env["KUBECONFIG"], "/call");
        assert_eq!(inv.env["HOME"], "/root");
        assert!(!inv.env.contains_key("EMPTY"));
    }

    #[test]
    fn test_display_and_program() {
        let argv = ArgVector::new("grype").arg("version");
        assert_eq!(argv.program(), "grype");
        assert_eq!(argv.to_string(), "grype version");
    }
}
