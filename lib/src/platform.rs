use std::fs::{copy, create_dir_all};
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::terraform::TerraformCli;
use crate::tfvars::TFVARS_FILE;
use crate::Result;

const DESTROY: &str = "terraform destroy -auto-approve";

/// Hooks a deployment target plugs into the provisioning lifecycle.
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Shell snippet run before every terraform call that talks to the
    /// provider, e.g. sourcing credentials.
    fn env_setup_cmd(&self) -> String {
        String::new()
    }

    fn cleanup_platform(&self, _tf: &TerraformCli) -> Result<()> {
        Ok(())
    }

    /// Extra platform logs. Returns `true` if collecting them failed.
    fn platform_logs(&self, _log_dir: &Path) -> bool {
        false
    }
}

pub fn from_config(conf: &Config) -> Result<Box<dyn Platform>> {
    match conf.platform.as_str() {
        "openstack" => Ok(Box::new(Openstack {
            openrc: conf.openstack.openrc.clone(),
        })),
        "vmware" => Ok(Box::new(Vmware {
            env_file: conf.vmware.env_file.clone(),
        })),
        "libvirt" => Ok(Box::new(Libvirt {
            tfdir: conf.terraform.tfdir.join("libvirt"),
        })),
        other => Err(Error::UnknownPlatform(other.to_string())),
    }
}

fn source(file: &Option<PathBuf>, platform: &str) -> String {
    match file {
        Some(file) => format!("source {}", file.display()),
        None => {
            warn!("no environment file configured for {}", platform);
            String::new()
        }
    }
}

pub struct Openstack {
    pub openrc: Option<PathBuf>,
}

impl Platform for Openstack {
    fn name(&self) -> &'static str {
        "openstack"
    }

    fn env_setup_cmd(&self) -> String {
        source(&self.openrc, self.name())
    }

    fn cleanup_platform(&self, tf: &TerraformCli) -> Result<()> {
        tf.run_in_env(DESTROY)
    }
}

pub struct Vmware {
    pub env_file: Option<PathBuf>,
}

impl Platform for Vmware {
    fn name(&self) -> &'static str {
        "vmware"
    }

    fn env_setup_cmd(&self) -> String {
        source(&self.env_file, self.name())
    }

    fn cleanup_platform(&self, tf: &TerraformCli) -> Result<()> {
        tf.run_in_env(DESTROY)
    }
}

/// Local hypervisor. Terraform's own files are the only platform logs.
pub struct Libvirt {
    pub tfdir: PathBuf,
}

impl Platform for Libvirt {
    fn name(&self) -> &'static str {
        "libvirt"
    }

    fn cleanup_platform(&self, tf: &TerraformCli) -> Result<()> {
        tf.run_in_env(DESTROY)
    }

    fn platform_logs(&self, log_dir: &Path) -> bool {
        let target = log_dir.join("libvirt");
        if let Err(e) = create_dir_all(&target) {
            error!("couldn't create {}: {}", target.display(), e);
            return true;
        }

        let mut failed = false;
        for artifact in &["terraform.tfstate", TFVARS_FILE] {
            let from = self.tfdir.join(artifact);
            match copy(&from, target.join(artifact)) {
                Ok(_) => info!("saved {}", from.display()),
                Err(e) => {
                    error!("couldn't save {}: {}", from.display(), e);
                    failed = true;
                }
            }
        }
        failed
    }
}
