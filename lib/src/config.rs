use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use shellexpand::tilde;

use crate::error::Error;
use crate::Result;

/// Run configuration, usually read from `vars.toml`.
///
/// Everything is fixed for the lifetime of a run except the node counts,
/// which `Terraform::provision` may override.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub platform: String,
    #[serde(deserialize_with = "expand_path")]
    pub workspace: PathBuf,
    #[serde(default, deserialize_with = "expand_opt_path")]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_nodeuser")]
    pub nodeuser: String,
    pub terraform: TerraformConfig,
    #[serde(default)]
    pub master: NodeConfig,
    #[serde(default)]
    pub worker: NodeConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub openstack: OpenstackConfig,
    #[serde(default)]
    pub vmware: VmwareConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerraformConfig {
    #[serde(deserialize_with = "expand_path")]
    pub tfdir: PathBuf,
    /// Template file name, relative to the platform directory.
    pub tfvars: String,
    #[serde(default, deserialize_with = "expand_opt_path")]
    pub plugin_dir: Option<PathBuf>,
    #[serde(default)]
    pub internal_net: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    /// Host that replaces `download.suse.de` in repository urls.
    #[serde(default)]
    pub mirror: Option<String>,
    #[serde(default = "default_retries")]
    pub retries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_count")]
    pub count: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            count: default_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_key_path", deserialize_with = "expand_path")]
    pub key_path: PathBuf,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            key_path: default_key_path(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_timeout")]
    pub timeout_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            timeout_secs: default_log_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenstackConfig {
    #[serde(default, deserialize_with = "expand_opt_path")]
    pub openrc: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmwareConfig {
    #[serde(default, deserialize_with = "expand_opt_path")]
    pub env_file: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path).map_err(Error::io(path))?;
        toml::from_str(&content).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.workspace.join("testrunner_logs"))
    }
}

fn default_nodeuser() -> String {
    "sles".into()
}

fn default_retries() -> usize {
    4
}

fn default_count() -> usize {
    1
}

fn default_key_path() -> PathBuf {
    PathBuf::from(tilde("~/.ssh/id_rsa").to_string())
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_log_timeout() -> u64 {
    600
}

fn expand_path<'de, D>(deserializer: D) -> std::result::Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(PathBuf::from(tilde(&raw).to_string()))
}

fn expand_opt_path<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|raw| PathBuf::from(tilde(&raw).to_string())))
}
