pub mod command_executor;
pub mod credentials;

pub use command_executor::{CommandError, SafeCommandExecutor};
pub use credentials::{mask_secret, Credentials, RepositoryEndpoint};
