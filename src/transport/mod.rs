//! Remote repository transports

pub mod http;

pub use http::ArtifactoryTransport;
