pub mod config;
pub mod error;
pub mod platform;
pub mod shell;
pub mod ssh;
pub mod terraform;
pub mod tfvars;
pub mod types;

pub use config::Config;
pub use error::Error;
pub use terraform::Terraform;
pub use types::Role;

pub type Result<T, E = Error> = std::result::Result<T, E>;
