//! Docker integration module

pub mod container;

pub use container::{CONTAINER_WORKDIR, ContainerConfig, ContainerDispatcher};
