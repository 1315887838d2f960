use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{} found. Please run cleanup and try again", .0.display())]
    StaleDeployment(PathBuf),
    #[error("{} not found. Please run provision and try again", .0.display())]
    NotDeployed(PathBuf),
    #[error("`{cmd}` failed: {details}")]
    CommandFailed { cmd: String, details: String },
    #[error("i/o error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing json from {}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("error parsing hcl from {}", .path.display())]
    Hcl {
        path: PathBuf,
        #[source]
        source: hcl::Error,
    },
    #[error("error parsing config {}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("terraform state has no output {0}")]
    MissingOutput(&'static str),
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
    #[error("{operation} exceeded its budget of {}s", .budget.as_secs())]
    Timeout {
        operation: &'static str,
        budget: Duration,
        #[source]
        source: tokio::time::error::Elapsed,
    },
    #[error("couldn't start the async runtime")]
    Runtime(#[source] std::io::Error),
    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),
    #[error("failure(s) during cleanup: {}", .0.join("; "))]
    CleanupIncomplete(Vec<String>),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Error {
        let path = path.into();
        move |source| Error::Json { path, source }
    }
}
