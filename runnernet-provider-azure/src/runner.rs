//! Process seam between the control plane and the `az` executable

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;

/// Captured result of one CLI invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs one CLI invocation to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with stdout and stderr captured
    async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput>;

    /// Run with stderr passed through to the terminal
    ///
    /// Used for login, where the CLI prints prompts (device codes, browser
    /// hints) the operator has to see. `stderr` of the result is empty.
    async fn run_attached(&self, args: &[String]) -> std::io::Result<CommandOutput> {
        self.run(args).await
    }
}

/// Runs the real `az` binary
#[derive(Debug, Clone)]
pub struct AzCommandRunner {
    program: PathBuf,
}

impl AzCommandRunner {
    pub const DEFAULT_PROGRAM: &'static str = "az";

    fn command(&self, args: &[String]) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(args).kill_on_drop(true);
        command
    }

    pub fn new() -> Self {
        Self::with_program(Self::DEFAULT_PROGRAM)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AzCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for AzCommandRunner {
    async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = self.command(args).output().await?;
        Ok(captured(output))
    }

    async fn run_attached(&self, args: &[String]) -> std::io::Result<CommandOutput> {
        // `output()` would force stderr to a pipe, so spawn explicitly
        let child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let output = child.wait_with_output().await?;
        Ok(captured(output))
    }
}

fn captured(output: std::process::Output) -> CommandOutput {
    CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
