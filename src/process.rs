//! External command execution.

use std::fmt;
use std::process::{Command, Stdio};

use crate::error::BenchError;

/// A fully resolved command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// Capture stdout/stderr instead of inheriting the parent's streams
    pub capture: bool,
}

impl CommandLine {
    /// Split a configured `[program, args...]` vector. Empty vectors are a config error.
    pub fn from_parts(parts: &[String]) -> Result<Self, BenchError> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| BenchError::Config("external command must not be empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            envs: Vec::new(),
            capture: true,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag(self, name: &str, value: impl ToString) -> Self {
        self.arg(name).arg(value.to_string())
    }

    /// Value following the flag `name`.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        let idx = self.args.iter().position(|a| a == name)?;
        self.args.get(idx + 1).map(String::as_str)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs a command to completion. There is no timeout.
pub trait CommandRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput, BenchError>;
}

/// `std::process` implementation.
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput, BenchError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let spawn_err = |source: std::io::Error| BenchError::Spawn {
            command: command.to_string(),
            source,
        };

        if command.capture {
            let output = cmd.output().map_err(spawn_err)?;
            Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        } else {
            let status = cmd
                .stdin(Stdio::null())
                .status()
                .map_err(spawn_err)?;
            Ok(CommandOutput {
                exit_code: status.code(),
                ..CommandOutput::default()
            })
        }
    }
}
