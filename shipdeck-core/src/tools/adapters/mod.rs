//! Tool families, one module per wrapped CLI

pub mod actionlint;
pub mod conftest;
pub mod gatekeeper;
pub mod grype;
pub mod kube_bench;
pub mod openscap;
pub mod syft;
pub mod trivy;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
pub(crate) mod testing {
    use serde_json::Value;

    use crate::Error;
    use crate::tools::cli_tool::ToolSpec;
    use crate::tools::request::ToolRequest;

    pub fn find<'a>(specs: &'a [ToolSpec], name: &str) -> &'a ToolSpec {
        specs
            .iter()
            .find(|s| s.name() == name)
            .unwrap_or_else(|| panic!("no tool named {name}"))
    }

    pub fn argv_of(specs: &[ToolSpec], name: &str, arguments: Value) -> Vec<String> {
        find(specs, name)
            .command_for(arguments)
            .unwrap()
            .into_vec()
    }

    pub fn build_error(specs: &[ToolSpec], name: &str, arguments: Value) -> Error {
        find(specs, name).command_for(arguments).unwrap_err()
    }

    pub fn request(spec: &ToolSpec, arguments: Value) -> ToolRequest {
        ToolRequest::from_arguments(&spec.schema, arguments).unwrap()
    }
}
