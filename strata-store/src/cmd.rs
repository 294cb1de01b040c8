//! Checked execution of external administration commands

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, StoreError};

fn render(program: &str, args: &[&str]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Runs a command to completion, capturing output. Non-zero exit becomes
/// `CommandFailed` carrying the trimmed stderr.
pub(crate) async fn run_checked(program: &str, args: &[&str]) -> Result<String> {
    let command = render(program, args);
    debug!("exec: {}", command);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| StoreError::Spawn {
            command: command.clone(),
            source,
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(StoreError::CommandFailed {
            command,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Runs a command used as an existence probe: success/failure is the answer,
/// output is discarded.
pub(crate) async fn probe(program: &str, args: &[&str]) -> Result<bool> {
    let command = render(program, args);
    debug!("probe: {}", command);

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| StoreError::Spawn { command, source })?;

    Ok(status.success())
}
