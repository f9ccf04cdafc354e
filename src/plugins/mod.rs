//! Adapters around the external package-manager tools

pub mod docker_plugin;
pub mod go_plugin;
pub mod nuget_plugin;

pub use docker_plugin::DockerCli;
pub use go_plugin::{GoModuleCache, GoToolchain};
pub use nuget_plugin::NugetCli;
