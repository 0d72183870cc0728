use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::error::ExecError;

/// Shell used when an entity does not name one
pub const DEFAULT_SHELL: &str = "bash";

/// Run `command` through `<shell> -c` and return its standard output.
///
/// Exactly one trailing newline is removed. A non-zero exit status is not an
/// error; only a shell that cannot be started is. There is no timeout: the child is
/// killed only if the returned future is dropped.
pub async fn run(command: &str, shell: &Path) -> Result<String, ExecError> {
    let output = Command::new(shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ExecError {
            command: command.to_string(),
            shell: shell.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        debug!("Command {:?} exited with {}", command, output.status);
    }

    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    strip_line_ending(&mut stdout);
    Ok(stdout)
}

/// Remove a single trailing `\n`, leaving any other whitespace (including `\r`) alone.
fn strip_line_ending(text: &mut String) {
    if text.ends_with('\n') {
        text.pop();
    }
}
