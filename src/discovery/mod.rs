//! Project discovery: solution files, Go modules, image references and
//! NuGet package lists

pub mod go_module;
pub mod image_reference;
pub mod packages_config;
pub mod solution;

pub use go_module::GoModule;
pub use image_reference::ImageReference;
pub use solution::{discover, Project, ProjectGraph, Solution};
