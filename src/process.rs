//! Child process execution.
//!
//! Both pipes are always drained at the same time so a chatty child can never
//! block on a full stdout buffer while we wait on stderr (or the reverse).

use crate::error::{PurrError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Echo child output line by line as it arrives
    Streamed,
    /// Keep output quiet and return it to the caller
    Buffered,
}

#[derive(Debug, Clone, Copy)]
enum Sink {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the child was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

async fn drain<R>(reader: Option<R>, echo: Option<Sink>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        match echo {
            Some(Sink::Stdout) => print!("{}", text),
            Some(Sink::Stderr) => eprint!("{}", text),
            None => {}
        }
        collected.push_str(&text);
    }
    Ok(collected)
}

fn describe(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` to completion. A non-zero exit is reported through
/// [`CommandOutput::code`], not as an error.
///
/// # Errors
///
/// [`PurrError::CommandFailed`] when the process cannot be started.
pub async fn run(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    envs: &[(&str, String)],
    mode: OutputMode,
) -> Result<CommandOutput> {
    let command_line = describe(program, args);
    tracing::debug!("running `{}`", command_line);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|e| PurrError::CommandFailed {
        command: command_line.clone(),
        message: e.to_string(),
    })?;

    let (out_echo, err_echo) = match mode {
        OutputMode::Streamed => (Some(Sink::Stdout), Some(Sink::Stderr)),
        OutputMode::Buffered => (None, None),
    };
    let (stdout, stderr, status) = tokio::join!(
        drain(child.stdout.take(), out_echo),
        drain(child.stderr.take(), err_echo),
        child.wait()
    );
    let status = status?;

    let output = CommandOutput {
        code: status.code(),
        stdout: stdout?,
        stderr: stderr?,
    };
    tracing::debug!("`{}` exited with {:?}", command_line, output.code);
    Ok(output)
}

/// Like [`run`], but a non-zero exit becomes [`PurrError::CommandFailed`]
/// carrying the child's stderr.
pub async fn run_checked(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    mode: OutputMode,
) -> Result<CommandOutput> {
    let output = run(program, args, cwd, &[], mode).await?;
    if output.success() {
        return Ok(output);
    }

    let stderr = output.stderr.trim();
    Err(PurrError::CommandFailed {
        command: describe(program, args),
        message: if stderr.is_empty() {
            format!("exit code {:?}", output.code)
        } else {
            stderr.to_string()
        },
    })
}
