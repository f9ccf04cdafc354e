pub mod version_gate;

pub use version_gate::{VersionGate, VersionThresholds};
