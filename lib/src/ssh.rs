use std::fs::{self, create_dir_all, read_to_string};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::error::Error;
use crate::shell::{Shell, ShellCommand};
use crate::Result;

pub const SSH_SOCK: &str = "ssh-sock";

/// What to copy off every node.
#[derive(Debug, Clone, Copy)]
pub struct LogManifest {
    pub files: &'static [&'static str],
    pub dirs: &'static [&'static str],
    pub services: &'static [&'static str],
}

pub const NODE_LOGS: LogManifest = LogManifest {
    files: &[
        "/var/run/cloud-init/status.json",
        "/var/log/cloud-init-output.log",
        "/var/log/cloud-init.log",
    ],
    dirs: &["/var/log/pods"],
    services: &["kubelet"],
};

/// Collectors run on a blocking worker thread.
pub trait RemoteLogCollector: Send + Sync {
    /// Copies everything in `manifest` from `ip` into `store`.
    ///
    /// Returns `true` if any single copy failed.
    fn collect(&self, ip: &str, manifest: &LogManifest, store: &Path) -> bool;
}

/// Dedicated ssh-agent plus the key and flags used to reach the nodes.
#[derive(Debug, Clone)]
pub struct SshAccess {
    pub key_path: PathBuf,
    pub user: String,
    pub sock: PathBuf,
    pub connect_timeout_secs: u64,
}

impl SshAccess {
    pub fn new(workspace: &Path, key_path: &Path, user: &str, connect_timeout_secs: u64) -> Self {
        SshAccess {
            key_path: key_path.to_path_buf(),
            user: user.to_string(),
            sock: workspace.join(SSH_SOCK),
            connect_timeout_secs,
        }
    }

    /// Starts a fresh agent on our socket and loads the key into it.
    pub fn setup(&self, shell: &dyn Shell) -> Result<()> {
        restrict_key(&self.key_path)?;

        let sock = self.sock.display();
        // Don't care if there is no agent to kill.
        if let Err(e) = shell.run(&ShellCommand::new(format!("pkill -f 'ssh-agent -a {}'", sock))) {
            info!("no stale ssh-agent: {}", e);
        }
        match fs::remove_file(&self.sock) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return Err(Error::Io {
                    path: self.sock.clone(),
                    source: e,
                })
            }
            _ => {}
        }

        shell.run(&ShellCommand::new(format!("ssh-agent -a {}", sock)))?;
        shell.run(
            &ShellCommand::new(format!("ssh-add {}", self.key_path.display()))
                .env("SSH_AUTH_SOCK", sock.to_string()),
        )?;
        Ok(())
    }

    /// Public half of the key, for the nodes' `authorized_keys`.
    pub fn authorized_keys(&self) -> Result<String> {
        let mut public = self.key_path.clone().into_os_string();
        public.push(".pub");
        let public = PathBuf::from(public);

        restrict_key(&self.key_path)?;
        let key = read_to_string(&public).map_err(Error::io(&public))?;
        Ok(key.trim().to_string())
    }

    fn flags(&self) -> String {
        format!(
            "-o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no -F /dev/null \
             -o LogLevel=ERROR -o ConnectTimeout={} -i {}",
            self.connect_timeout_secs,
            self.key_path.display()
        )
    }

    fn command(&self, cmd: String) -> ShellCommand {
        ShellCommand::new(cmd).env("SSH_AUTH_SOCK", self.sock.display().to_string())
    }

    pub fn ssh(&self, ip: &str, remote: &str) -> ShellCommand {
        self.command(format!(
            "ssh {} {}@{} \"{}\"",
            self.flags(),
            self.user,
            ip,
            remote
        ))
    }

    pub fn scp(&self, ip: &str, remote: &str, local: &Path) -> ShellCommand {
        self.command(format!(
            "scp {} {}@{}:{} {}",
            self.flags(),
            self.user,
            ip,
            remote,
            local.display()
        ))
    }

    pub fn rsync(&self, ip: &str, remote: &str, local: &Path) -> ShellCommand {
        self.command(format!(
            "rsync -avz --rsync-path='sudo rsync' -e 'ssh {}' {}@{}:{} {}",
            self.flags(),
            self.user,
            ip,
            remote,
            local.display()
        ))
    }
}

fn restrict_key(key_path: &Path) -> Result<()> {
    fs::set_permissions(key_path, fs::Permissions::from_mode(0o400)).map_err(Error::io(key_path))
}

/// Collects logs with scp, rsync and journalctl over ssh.
pub struct SshLogCollector<S: Shell> {
    access: SshAccess,
    shell: S,
}

impl<S: Shell> SshLogCollector<S> {
    pub fn new(access: SshAccess, shell: S) -> Self {
        SshLogCollector { access, shell }
    }

    fn attempt(&self, what: &str, ip: &str, cmd: &ShellCommand) -> bool {
        match self.shell.run(cmd) {
            Ok(()) => false,
            Err(e) => {
                error!("failed to collect {} from {}: {}", what, ip, e);
                true
            }
        }
    }
}

impl<S: Shell + Send + Sync> RemoteLogCollector for SshLogCollector<S> {
    fn collect(&self, ip: &str, manifest: &LogManifest, store: &Path) -> bool {
        if let Err(e) = create_dir_all(store) {
            error!("couldn't create {}: {}", store.display(), e);
            return true;
        }

        let mut failed = false;

        for file in manifest.files {
            failed |= self.attempt(file, ip, &self.access.scp(ip, file, store));
        }

        for dir in manifest.dirs {
            failed |= self.attempt(dir, ip, &self.access.rsync(ip, dir, store));
        }

        for service in manifest.services {
            let journal = format!("{}.log", service);
            let dump = self.access.ssh(
                ip,
                &format!("sudo journalctl -xeu {} > {}", service, journal),
            );
            if self.attempt(service, ip, &dump) {
                failed = true;
                continue;
            }
            failed |= self.attempt(&journal, ip, &self.access.scp(ip, &journal, store));
        }

        if failed {
            warn!("some logs of {} are missing", ip);
        }
        failed
    }
}
