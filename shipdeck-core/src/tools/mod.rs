//! Tool catalog: schemas, argument vectors, result normalization and the CLI adapters

pub mod adapters;
pub mod argv;
pub mod catalog;
pub mod cli_tool;
pub mod normalize;
pub mod request;
pub mod schema;

pub use argv::ArgVector;
pub use catalog::{Category, FAMILIES, Family, Selection, register_selection};
pub use cli_tool::{CliTool, ToolContext, ToolSpec};
pub use schema::{ParamKind, ParamSpec, ToolSchema};
