//! Installer and uninstaller script execution.
//!
//! Packages installed from source ship a script that builds or copies the
//! program into place. The script's extension picks the interpreter; scripts
//! without one are sniffed for a `#!` line.
//!
//! Every script runs inside the package directory with three variables set:
//!
//! | variable            | value                                 |
//! |---------------------|---------------------------------------|
//! | `PURR_CWD`          | working directory of the script       |
//! | `PURR_INSTALL_DIR`  | user bin directory                    |
//! | `PURR_PACKAGE_NAME` | package being installed or removed    |

use crate::error::{PurrError, Result};
use crate::platform::OsFamily;
use crate::process::{self, CommandOutput, OutputMode};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Shell,
    PowerShell,
    Python,
    Node,
    Ruby,
    /// `cmd /c` for .cmd and .bat files
    WindowsCommand,
    /// The script itself is executable
    Native,
    /// Absolute interpreter path taken from the `#!` line
    Shebang,
}

/// Resolved program and arguments for a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    pub interpreter: Interpreter,
    pub program: String,
    pub args: Vec<String>,
}

impl ScriptCommand {
    fn new(interpreter: Interpreter, os: OsFamily, script: &Path) -> Self {
        let path = script.to_string_lossy().into_owned();
        let (program, args) = match interpreter {
            Interpreter::Shell => ("bash".to_string(), vec![path]),
            Interpreter::PowerShell => {
                let program = if os.is_windows() { "powershell" } else { "pwsh" };
                (
                    program.to_string(),
                    vec![
                        "-NoProfile".to_string(),
                        "-ExecutionPolicy".to_string(),
                        "Bypass".to_string(),
                        "-File".to_string(),
                        path,
                    ],
                )
            }
            Interpreter::Python => {
                let program = if os.is_windows() { "python" } else { "python3" };
                (program.to_string(), vec![path])
            }
            Interpreter::Node => ("node".to_string(), vec![path]),
            Interpreter::Ruby => ("ruby".to_string(), vec![path]),
            Interpreter::WindowsCommand => ("cmd".to_string(), vec!["/c".to_string(), path]),
            Interpreter::Native | Interpreter::Shebang => (path, Vec::new()),
        };
        Self {
            interpreter,
            program,
            args,
        }
    }
}

/// Invocation context exported to the script
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub cwd: PathBuf,
    pub install_dir: PathBuf,
    pub package_name: String,
}

impl ScriptContext {
    fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PURR_CWD", self.cwd.to_string_lossy().into_owned()),
            (
                "PURR_INSTALL_DIR",
                self.install_dir.to_string_lossy().into_owned(),
            ),
            ("PURR_PACKAGE_NAME", self.package_name.clone()),
        ]
    }
}

/// First line of `path` if it is a `#!` line, without the marker
fn read_shebang(path: &Path) -> Option<String> {
    let mut head = [0u8; 256];
    let n = fs::File::open(path).and_then(|mut f| f.read(&mut head)).ok()?;
    let text = String::from_utf8_lossy(&head[..n]);
    let first = text.lines().next()?;
    first.strip_prefix("#!").map(|rest| rest.trim().to_string())
}

/// Interpreter named by a shebang. `/usr/bin/env -S python3 -u` names
/// `python3`.
fn shebang_interpreter(shebang: &str) -> Option<Interpreter> {
    let mut words = shebang.split_whitespace();
    let first = words.next()?;
    let mut name = Path::new(first).file_name()?.to_str()?;
    if name == "env" {
        name = words.find(|w| !w.starts_with('-'))?;
    }

    match name {
        "sh" | "bash" | "dash" | "zsh" | "ksh" => Some(Interpreter::Shell),
        n if n.starts_with("python") => Some(Interpreter::Python),
        "node" | "nodejs" => Some(Interpreter::Node),
        n if n.starts_with("ruby") => Some(Interpreter::Ruby),
        _ => None,
    }
}

fn resolve_extensionless(path: &Path, os: OsFamily) -> ScriptCommand {
    let shebang = read_shebang(path);

    if let Some(line) = &shebang {
        if let Some(interpreter) = shebang_interpreter(line) {
            return ScriptCommand::new(interpreter, os, path);
        }

        let mut words = line.split_whitespace();
        if let Some(program) = words.next()
            && Path::new(program).is_absolute()
            && Path::new(program).exists()
        {
            let mut args: Vec<String> = words.map(str::to_string).collect();
            args.push(path.to_string_lossy().into_owned());
            return ScriptCommand {
                interpreter: Interpreter::Shebang,
                program: program.to_string(),
                args,
            };
        }
    }

    if !os.is_windows() && mark_executable(path).is_ok() {
        return ScriptCommand::new(Interpreter::Native, os, path);
    }
    tracing::debug!("falling back to shell for {}", path.display());
    ScriptCommand::new(Interpreter::Shell, os, path)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

/// Decide how to run `path` on `os`.
///
/// # Errors
///
/// [`PurrError::UnsupportedScript`] for extensions with no known interpreter,
/// and for Windows-only script types elsewhere.
pub fn resolve_interpreter(path: &Path, os: OsFamily) -> Result<ScriptCommand> {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
        return Ok(resolve_extensionless(path, os));
    };

    let unsupported = || PurrError::UnsupportedScript {
        path: path.to_path_buf(),
        extension: ext.clone(),
    };

    let interpreter = match ext.as_str() {
        "sh" => Interpreter::Shell,
        "ps1" => Interpreter::PowerShell,
        "py" => Interpreter::Python,
        "js" => Interpreter::Node,
        "rb" => Interpreter::Ruby,
        "cmd" | "bat" if os.is_windows() => Interpreter::WindowsCommand,
        "exe" if os.is_windows() => Interpreter::Native,
        _ => return Err(unsupported()),
    };
    Ok(ScriptCommand::new(interpreter, os, path))
}

/// Run the script at `path` with the context variables set.
///
/// # Errors
///
/// Resolution errors from [`resolve_interpreter`], and
/// [`PurrError::ScriptFailed`] when the script exits non-zero.
pub async fn run_script(
    path: &Path,
    context: &ScriptContext,
    os: OsFamily,
    mode: OutputMode,
) -> Result<CommandOutput> {
    let command = resolve_interpreter(path, os)?;
    tracing::debug!(
        "script {} via {:?} ({})",
        path.display(),
        command.interpreter,
        command.program
    );

    let output = process::run(
        &command.program,
        &command.args,
        Some(&context.cwd),
        &context.env(),
        mode,
    )
    .await?;

    if !output.success() {
        return Err(PurrError::ScriptFailed {
            path: path.to_path_buf(),
            code: output.code.unwrap_or(-1),
        });
    }
    Ok(output)
}
