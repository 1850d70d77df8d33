//! Tool families and selection of what a server exposes

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::mcp::McpServer;
use crate::tools::adapters::{
    actionlint, conftest, gatekeeper, grype, kube_bench, openscap, syft, trivy,
};
use crate::tools::cli_tool::{CliTool, ToolContext, ToolSpec};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Security,
    SupplyChain,
    Kubernetes,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::Security, Self::SupplyChain, Self::Kubernetes];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::SupplyChain => "supply-chain",
            Self::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnknownTool(s.to_string()))
    }
}

/// All tools wrapping one CLI
pub struct Family {
    pub name: &'static str,
    pub category: Category,
    pub description: &'static str,
    pub tools: fn() -> Vec<ToolSpec>,
}

pub static FAMILIES: &[Family] = &[
    Family {
        name: "actionlint",
        category: Category::Security,
        description: "GitHub Actions workflow linting",
        tools: actionlint::tools,
    },
    Family {
        name: "grype",
        category: Category::Security,
        description: "Vulnerability scanning of images, directories and SBOMs",
        tools: grype::tools,
    },
    Family {
        name: "trivy",
        category: Category::Security,
        description: "Vulnerability, misconfiguration and secret scanning",
        tools: trivy::tools,
    },
    Family {
        name: "openscap",
        category: Category::Security,
        description: "SCAP compliance evaluation",
        tools: openscap::tools,
    },
    Family {
        name: "conftest",
        category: Category::Security,
        description: "OPA policy tests for structured configuration",
        tools: conftest::tools,
    },
    Family {
        name: "syft",
        category: Category::SupplyChain,
        description: "SBOM generation",
        tools: syft::tools,
    },
    Family {
        name: "kube-bench",
        category: Category::Kubernetes,
        description: "CIS Kubernetes benchmark",
        tools: kube_bench::tools,
    },
    Family {
        name: "gatekeeper",
        category: Category::Kubernetes,
        description: "OPA Gatekeeper admission control",
        tools: gatekeeper::tools,
    },
];

/// Which families a server exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Category(Category),
    Family(&'static str),
}

impl Selection {
    /// `all`, a category name, or a family name (`kube_bench` is accepted for `kube-bench`)
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim().to_ascii_lowercase();
        if name.is_empty() || name == "all" {
            return Ok(Self::All);
        }
        if let Ok(category) = name.parse::<Category>() {
            return Ok(Self::Category(category));
        }
        let dashed = name.replace('_', "-");
        FAMILIES
            .iter()
            .find(|f| f.name == dashed)
            .map(|f| Self::Family(f.name))
            .ok_or_else(|| Error::UnknownTool(raw.to_string()))
    }

    pub fn includes(&self, family: &Family) -> bool {
        match self {
            Self::All => true,
            Self::Category(category) => family.category == *category,
            Self::Family(name) => family.name == *name,
        }
    }

    /// Families covered by this selection, in catalog order
    pub fn families(&self) -> impl Iterator<Item = &'static Family> + '_ {
        FAMILIES.iter().filter(move |f| self.includes(f))
    }

    /// Suffix of the default server name
    pub fn label(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Category(category) => category.as_str(),
            Self::Family(name) => name,
        }
    }
}

impl FromStr for Selection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Register every tool of the selection; returns how many were registered
pub async fn register_selection(
    server: &McpServer,
    selection: &Selection,
    ctx: Arc<ToolContext>,
) -> Result<usize> {
    let mut count = 0;
    for family in selection.families() {
        let specs = (family.tools)();
        debug!("Registering {} {} tools", specs.len(), family.name);
        for spec in specs {
            server
                .register_tool(Arc::new(CliTool::new(spec, Arc::clone(&ctx))))
                .await?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use std::collections::HashSet;

    #[test]
    fn test_tool_names_are_unique() {
        let mut seen = HashSet::new();
        for family in FAMILIES {
            for spec in (family.tools)() {
                assert!(seen.insert(spec.name().to_string()), "duplicate {}", spec.name());
            }
        }
        assert!(seen.len() > 50);
    }

    #[test]
    fn test_every_tool_has_description_and_valid_defaults() {
        for family in FAMILIES {
            for spec in (family.tools)() {
                assert!(!spec.schema.description.is_empty(), "{}", spec.name());
                for param in &spec.schema.params {
                    if let Some(default) = &param.default {
                        let mut probe = serde_json::Map::new();
                        probe.insert(param.name.clone(), default.clone());
                        spec.schema.validate(&serde_json::Value::Object(probe)).unwrap();
                    }
                }
            }
        }
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!(Selection::parse("all").unwrap(), Selection::All);
        assert_eq!(
            Selection::parse("supply-chain").unwrap(),
            Selection::Category(Category::SupplyChain)
        );
        assert_eq!(
            Selection::parse("kube_bench").unwrap(),
            Selection::Family("kube-bench")
        );
        assert_eq!(Selection::parse("Trivy").unwrap(), Selection::Family("trivy"));
        assert!(matches!(
            Selection::parse("nmap"),
            Err(Error::UnknownTool(ref s)) if s == "nmap"
        ));
    }

    #[test]
    fn test_category_membership() {
        let names: Vec<&str> = Selection::Category(Category::Kubernetes)
            .families()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["kube-bench", "gatekeeper"]);
    }

    #[tokio::test]
    async fn test_register_family() {
        let server = McpServer::new("shipdeck-syft", "0.1.0");
        let ctx = Arc::new(ToolContext::new(Arc::new(RecordingDispatcher::new())));
        let count = register_selection(&server, &Selection::Family("syft"), ctx)
            .await
            .unwrap();
        assert_eq!(count, syft::tools().len());
        assert!(server.tool_names().await.iter().all(|n| n.starts_with("syft_")));
    }

    #[tokio::test]
    async fn test_registering_twice_is_rejected() {
        let server = McpServer::new("shipdeck", "0.1.0");
        let ctx = Arc::new(ToolContext::new(Arc::new(RecordingDispatcher::new())));
        let selection = Selection::Family("grype");
        register_selection(&server, &selection, Arc::clone(&ctx))
            .await
            .unwrap();
        assert!(matches!(
            register_selection(&server, &selection, ctx).await,
            Err(Error::DuplicateTool(_))
        ));
    }
}
