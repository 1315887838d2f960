use std::env;
use std::fs::{create_dir_all, read_to_string, remove_dir_all, remove_file, symlink_metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::*;
use log::{error, info, warn};
use serde_json::{json, Map, Value};
use tokio::{runtime, task, time};

use crate::config::Config;
use crate::error::Error;
use crate::platform::{self, Platform};
use crate::shell::{Shell, ShellCommand, SystemShell};
use crate::ssh::{RemoteLogCollector, SshAccess, SshLogCollector, NODE_LOGS};
use crate::tfvars;
use crate::types::{OutputMapping, Role, TerraformState};
use crate::Result;

pub const PLAN_FILE: &str = "tfout";
pub const OUTPUT_FILE: &str = "tfout.json";
pub const STATE_FILE: &str = "terraform.tfstate";

/// Runs terraform in a platform directory.
pub struct TerraformCli {
    tfdir: PathBuf,
    ssh_sock: PathBuf,
    env_setup: String,
    shell: Box<dyn Shell>,
}

impl TerraformCli {
    pub fn new(tfdir: PathBuf, ssh_sock: PathBuf, env_setup: String, shell: Box<dyn Shell>) -> Self {
        TerraformCli {
            tfdir,
            ssh_sock,
            env_setup,
            shell,
        }
    }

    pub fn tfdir(&self) -> &Path {
        &self.tfdir
    }

    pub fn shell(&self) -> &dyn Shell {
        &*self.shell
    }

    /// Terraform gets `PATH` and `SSH_AUTH_SOCK`, nothing else.
    pub fn run(&self, cmd: &str) -> Result<()> {
        let path = env::var("PATH").unwrap_or_default();
        self.shell.run(
            &ShellCommand::new(cmd)
                .cwd(&self.tfdir)
                .isolated()
                .env("SSH_AUTH_SOCK", self.ssh_sock.display().to_string())
                .env("PATH", path),
        )
    }

    /// Like `run`, behind the platform's environment setup.
    pub fn run_in_env(&self, cmd: &str) -> Result<()> {
        if self.env_setup.is_empty() {
            self.run(cmd)
        } else {
            self.run(&format!("{}; {}", self.env_setup, cmd))
        }
    }
}

/// One provisioning lifecycle against one platform:
/// provision, then any number of `gather_logs`, then `cleanup`.
pub struct Terraform {
    conf: Config,
    platform: Arc<dyn Platform>,
    cli: TerraformCli,
    ssh: SshAccess,
    collector: Arc<dyn RemoteLogCollector>,
    tfjson_path: PathBuf,
    state: Option<TerraformState>,
    outputs: Option<OutputMapping>,
}

impl Terraform {
    pub fn new(
        conf: Config,
        platform: Box<dyn Platform>,
        shell: Box<dyn Shell>,
        collector: Box<dyn RemoteLogCollector>,
    ) -> Self {
        let ssh = ssh_access(&conf);
        Terraform::with_ssh(conf, ssh, platform, shell, collector)
    }

    /// Wires up the real shell, ssh transport and the configured platform.
    pub fn from_config(conf: Config) -> Result<Self> {
        let platform = platform::from_config(&conf)?;
        let ssh = ssh_access(&conf);
        let collector = Box::new(SshLogCollector::new(ssh.clone(), SystemShell));
        Ok(Terraform::with_ssh(
            conf,
            ssh,
            platform,
            Box::new(SystemShell),
            collector,
        ))
    }

    fn with_ssh(
        conf: Config,
        ssh: SshAccess,
        platform: Box<dyn Platform>,
        shell: Box<dyn Shell>,
        collector: Box<dyn RemoteLogCollector>,
    ) -> Self {
        let cli = TerraformCli::new(
            conf.terraform.tfdir.join(&conf.platform),
            ssh.sock.clone(),
            platform.env_setup_cmd(),
            shell,
        );
        let tfjson_path = conf.workspace.join(OUTPUT_FILE);

        Terraform {
            conf,
            platform: Arc::from(platform),
            cli,
            ssh,
            collector: Arc::from(collector),
            tfjson_path,
            state: None,
            outputs: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.conf
    }

    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    /// Creates and applies the terraform plan.
    ///
    /// Apply is retried up to `terraform.retries` times. The outputs are
    /// fetched after every attempt so a failed run still leaves them behind.
    pub fn provision(&mut self, masters: Option<usize>, workers: Option<usize>) -> Result<()> {
        if masters.is_some() || workers.is_some() {
            info!("Overriding number of nodes");
            if let Some(count) = masters {
                self.conf.master.count = count;
                info!("   Masters: {}", count);
            }
            if let Some(count) = workers {
                self.conf.worker.count = count;
                info!("   Workers: {}", count);
            }
        }

        info!("Init terraform");
        self.check_not_deployed()?;

        self.ssh.setup(self.cli.shell())?;

        let mut init_cmd = String::from("terraform init");
        if let Some(plugin_dir) = &self.conf.terraform.plugin_dir {
            info!("Installing plugins from {}", plugin_dir.display());
            init_cmd.push_str(&format!(" -plugin-dir={}", plugin_dir.display()));
        }
        self.cli.run(&init_cmd)?;
        self.cli.run("terraform version")?;

        self.generate_tfvars_file()?;

        let plan_file = self.conf.workspace.join(PLAN_FILE);
        let plan_cmd = format!("terraform plan -out {}", plan_file.display());
        let apply_cmd = format!("terraform apply -auto-approve {}", plan_file.display());

        let retries = self.conf.terraform.retries.max(1);
        let mut attempt = 1;
        loop {
            info!(
                "{}",
                format!("Run terraform plan - execution # {}", attempt).yellow()
            );
            if let Err(e) = self.cli.run_in_env(&plan_cmd) {
                self.fetch_after_failure();
                return Err(e);
            }

            info!(
                "{}",
                format!("Run terraform apply - execution # {}", attempt).yellow()
            );
            match self.cli.run_in_env(&apply_cmd) {
                Ok(()) => return self.fetch_terraform_output(),
                Err(e) => {
                    error!("Failed terraform apply n. {}", attempt);
                    self.fetch_after_failure();
                    if attempt >= retries {
                        error!(
                            "{}",
                            format!("Failed {} terraform deployment", self.platform.name()).red()
                        );
                        return Err(e);
                    }
                }
            }
            attempt += 1;
        }
    }

    /// Keeps whatever outputs a failed attempt produced; the attempt's own error wins.
    fn fetch_after_failure(&self) {
        if let Err(e) = self.fetch_terraform_output() {
            warn!("couldn't fetch terraform output: {}", e);
        }
    }

    fn fetch_terraform_output(&self) -> Result<()> {
        self.cli.run_in_env(&format!(
            "terraform output -json > {}",
            self.tfjson_path.display()
        ))
    }

    fn generate_tfvars_file(&self) -> Result<()> {
        let template = self.cli.tfdir().join(&self.conf.terraform.tfvars);
        let mut overrides = Map::new();
        if let Some(net) = &self.conf.terraform.internal_net {
            overrides.insert("internal_net".into(), json!(net));
        }
        if let Some(stack) = &self.conf.terraform.stack_name {
            overrides.insert("stack_name".into(), json!(stack));
        }
        overrides.insert("username".into(), json!(self.conf.nodeuser));
        overrides.insert("masters".into(), json!(self.conf.master.count));
        overrides.insert("workers".into(), json!(self.conf.worker.count));
        overrides.insert(
            "authorized_keys".into(),
            Value::Array(vec![json!(self.ssh.authorized_keys()?)]),
        );

        tfvars::render(
            &template,
            self.cli.tfdir(),
            overrides,
            self.conf.terraform.mirror.as_deref(),
        )
    }

    fn check_not_deployed(&self) -> Result<()> {
        if self.tfjson_path.exists() {
            return Err(Error::StaleDeployment(self.tfjson_path.clone()));
        }
        Ok(())
    }

    /// Fails unless a previous `provision` left its outputs behind.
    pub fn verify_deployed(&self) -> Result<()> {
        if !self.tfjson_path.exists() {
            return Err(Error::NotDeployed(self.tfjson_path.clone()));
        }
        Ok(())
    }

    fn state(&mut self) -> Result<&TerraformState> {
        let state = match self.state.take() {
            Some(state) => state,
            None => {
                let path = self.cli.tfdir().join(STATE_FILE);
                info!("Reading {}", path.display());
                let content = read_to_string(&path).map_err(Error::io(&path))?;
                serde_json::from_str(&content).map_err(Error::json(&path))?
            }
        };
        Ok(self.state.insert(state))
    }

    /// Parsed `terraform output -json`, read once.
    pub fn outputs(&mut self) -> Result<&OutputMapping> {
        let outputs = match self.outputs.take() {
            Some(outputs) => outputs,
            None => {
                let path = &self.tfjson_path;
                let content = read_to_string(path).map_err(Error::io(path))?;
                serde_json::from_str(&content).map_err(Error::json(path))?
            }
        };
        Ok(self.outputs.insert(outputs))
    }

    pub fn lb_address(&mut self) -> Result<String> {
        Ok(self.state()?.lb_address()?.to_string())
    }

    /// Node IPs for `"master"` or `"worker"`.
    pub fn node_addresses(&mut self, role: &str) -> Result<Vec<String>> {
        self.role_addresses(role.parse()?)
    }

    pub fn role_addresses(&mut self, role: Role) -> Result<Vec<String>> {
        Ok(self.state()?.node_addresses(role)?.to_vec())
    }

    /// Copies the node logs into the log dir.
    ///
    /// Returns `true` if anything could not be collected. Taking longer than
    /// `log.timeout_secs` fails the whole operation, even while a node is
    /// still being copied.
    pub fn gather_logs(&mut self) -> Result<bool> {
        let budget = Duration::from_secs(self.conf.log.timeout_secs);

        self.verify_deployed()?;

        let mut nodes = Vec::new();
        for role in Role::ALL {
            for ip in self.state()?.node_addresses(role)? {
                nodes.push((role, ip.clone()));
            }
        }

        let log_dir = self.conf.log_dir();
        if !log_dir.is_dir() {
            create_dir_all(&log_dir).map_err(Error::io(&log_dir))?;
            info!("Created log dir {}", log_dir.display());
        }

        let collector = Arc::clone(&self.collector);
        let platform = Arc::clone(&self.platform);
        let gathering = async move {
            let mut logging_errors = false;
            for (role, ip) in nodes {
                let node_log_dir = create_node_log_dir(&ip, role, &log_dir)?;
                let collector = Arc::clone(&collector);
                logging_errors |= task::spawn_blocking(move || {
                    collector.collect(&ip, &NODE_LOGS, &node_log_dir)
                })
                .await?;
            }
            logging_errors |= task::spawn_blocking(move || platform.platform_logs(&log_dir)).await?;
            Ok::<_, Error>(logging_errors)
        };

        let runtime = runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(Error::Runtime)?;
        let result = runtime.block_on(time::timeout(budget, gathering));
        // Don't wait for copies that are still hanging.
        runtime.shutdown_background();

        result.map_err(|source| {
            error!("{}", format!("Log collection exceeded {}s", budget.as_secs()).red());
            Error::Timeout {
                operation: "gather_logs",
                budget,
                source,
            }
        })?
    }

    /// Best-effort teardown: every step runs, failures are reported at the end.
    pub fn cleanup(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        if let Err(e) = self.platform.cleanup_platform(&self.cli) {
            error!("{}", format!("Received the following error {}", e).red());
            info!("Attempting to finish cleanup");
            failures.push(e.to_string());
        }

        for path in [self.conf.workspace.join(PLAN_FILE), self.tfjson_path.clone()] {
            if let Err(e) = force_remove(&path) {
                error!("Received the following error {}", e);
                info!("Attempting to finish cleanup");
                failures.push(e.to_string());
            }
        }

        self.state = None;
        self.outputs = None;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::CleanupIncomplete(failures))
        }
    }
}

pub fn node_log_dir_name(ip: &str, role: Role) -> String {
    format!("{}_{}", role, ip.replace(|c: char| c == '.' || c == ':', "_"))
}

fn create_node_log_dir(ip: &str, role: Role, log_dir: &Path) -> Result<PathBuf> {
    let path = log_dir.join(node_log_dir_name(ip, role));
    if !path.is_dir() {
        create_dir_all(&path).map_err(Error::io(&path))?;
        info!("Created log dir {}", path.display());
    }
    Ok(path)
}

fn ssh_access(conf: &Config) -> SshAccess {
    SshAccess::new(
        &conf.workspace,
        &conf.ssh.key_path,
        &conf.nodeuser,
        conf.ssh.connect_timeout_secs,
    )
}

/// `rm -rf`: a missing path is not an error.
fn force_remove(path: &Path) -> Result<()> {
    let result = match symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir_all(path),
        Ok(_) => remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}
