use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use execute::Execute;
use log::info;

use crate::error::Error;
use crate::Result;

/// A single `sh -c` invocation.
///
/// Every command owns its environment map, so nothing set for one
/// invocation leaks into the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub cmd: String,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Start from an empty environment instead of inheriting ours.
    pub isolated: bool,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        ShellCommand {
            cmd: cmd.into(),
            cwd: None,
            env: HashMap::new(),
            isolated: false,
        }
    }

    pub fn cwd(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.insert(key.to_string(), value.into());
        self
    }

    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }
}

pub trait Shell {
    /// Runs the command to completion; a non-zero exit is an error.
    fn run(&self, cmd: &ShellCommand) -> Result<()>;
}

impl<S: Shell + ?Sized> Shell for &S {
    fn run(&self, cmd: &ShellCommand) -> Result<()> {
        (**self).run(cmd)
    }
}

impl<S: Shell + ?Sized> Shell for Box<S> {
    fn run(&self, cmd: &ShellCommand) -> Result<()> {
        (**self).run(cmd)
    }
}

/// Runs commands through the system `sh`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&self, cmd: &ShellCommand) -> Result<()> {
        match &cmd.cwd {
            Some(cwd) => info!("$ {} > {}", cwd.display(), cmd.cmd),
            None => info!("$ {}", cmd.cmd),
        }

        let mut command = execute::shell(&cmd.cmd);
        if let Some(cwd) = &cmd.cwd {
            command.current_dir(cwd);
        }
        if cmd.isolated {
            command.env_clear();
        }
        command.envs(&cmd.env);
        command.stderr(Stdio::piped());

        let failed = |details: String| Error::CommandFailed {
            cmd: cmd.cmd.clone(),
            details,
        };

        match command.execute_output() {
            Ok(output) => match output.status.code() {
                Some(0) => Ok(()),
                Some(code) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(failed(format!("exit code {}: {}", code, stderr.trim())))
                }
                None => Err(failed("interrupted".into())),
            },
            Err(e) => Err(failed(e.to_string())),
        }
    }
}
