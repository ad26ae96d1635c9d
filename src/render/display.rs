use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::AppError;

/// Hands the rendered image to the platform's default viewer without waiting
/// for it to close.
pub fn open_in_viewer(path: &Path) -> Result<(), AppError> {
    let mut command = viewer_command();
    command
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AppError::io(path, e))?;
    Ok(())
}

fn viewer_command() -> Command {
    if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        Command::new("xdg-open")
    }
}
