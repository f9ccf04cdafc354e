//! SafeCommandExecutor: whitelisted execution of package-manager tools
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: Only pre-approved tools can execute
//! - **Injection prevention**: Arguments are passed as a vector to
//!   `tokio::process::Command`, never through a shell
//! - **Explicit environment**: Resolution redirects are applied per
//!   invocation, the process environment is never mutated
//! - **Working directory validation**: Validates existence before execution
//! - **Timeout control**: Hung tools are killed after the configured duration
//!
//! # Example
//!
//! ```rust,no_run
//! use artifact_publisher::core::{ToolInvocation, ToolRunner};
//! use artifact_publisher::security::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! executor.ensure_available("go")?;
//! let output = executor.run(ToolInvocation::new("go", ["version"])).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

use crate::core::error::PublishError;
use crate::core::traits::{ToolInvocation, ToolOutput, ToolRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Tools the publisher is allowed to launch
const ALLOWED_COMMANDS: &[&str] = &["go", "docker", "nuget", "dotnet"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Executable could not be found on PATH
    #[error("Command '{0}' was not found on PATH")]
    NotFound(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command execution failed (e.g., permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

impl CommandError {
    fn into_publish_error(self, tool: &str) -> PublishError {
        match self {
            CommandError::NotFound(tool) => PublishError::PrerequisiteMissing { tool },
            other => PublishError::ToolFailed {
                tool: tool.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    /// Default working directory for invocations without their own
    working_dir: PathBuf,
    /// Optional timeout for command execution
    timeout: Option<Duration>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
        })
    }

    /// Set command execution timeout.
    ///
    /// Tools exceeding this duration are killed.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn check_allowed(command: &str) -> Result<(), CommandError> {
        if ALLOWED_COMMANDS.contains(&command) {
            Ok(())
        } else {
            Err(CommandError::CommandNotAllowed(command.to_string()))
        }
    }

    /// Locate a whitelisted tool on PATH
    pub fn locate(&self, command: &str) -> Result<PathBuf, CommandError> {
        Self::check_allowed(command)?;
        which::which(command).map_err(|_| CommandError::NotFound(command.to_string()))
    }

    /// Execute an invocation with whitelist validation
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput, CommandError> {
        Self::check_allowed(&invocation.program)?;

        let dir = invocation
            .current_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.clone());
        if !dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(dir));
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&dir)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &invocation.env_remove {
            command.env_remove(name);
        }
        for (name, value) in &invocation.env {
            command.env(name, value);
        }

        tracing::debug!(
            program = %invocation.program,
            args = ?invocation.args,
            dir = %dir.display(),
            "running tool"
        );

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::NotFound(invocation.program.clone()),
            _ => CommandError::ExecutionFailed(e.to_string()),
        })?;

        if let Some(input) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input)
                    .await
                    .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;
                // Dropping closes the pipe so the tool sees EOF.
                drop(stdin);
            }
        }

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| CommandError::Timeout(limit))?,
            None => wait.await,
        }
        .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        Ok(ToolOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ToolRunner for SafeCommandExecutor {
    fn ensure_available(&self, tool: &str) -> Result<PathBuf, PublishError> {
        self.locate(tool).map_err(|e| e.into_publish_error(tool))
    }

    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, PublishError> {
        let tool = invocation.program.clone();
        self.execute(&invocation)
            .await
            .map_err(|e| e.into_publish_error(&tool))
    }
}
