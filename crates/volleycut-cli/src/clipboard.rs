//! System clipboard

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("Failed to spawn {0}: {1}")]
    Spawn(&'static str, std::io::Error),

    #[error("Failed to write to {0}: {1}")]
    Write(&'static str, std::io::Error),

    #[error("{0} exited with status {1}")]
    Exit(&'static str, std::process::ExitStatus),

    #[error("No clipboard command for this platform")]
    Unsupported,
}

fn clipboard_command() -> Result<(&'static str, &'static [&'static str]), ClipboardError> {
    if cfg!(target_os = "macos") {
        Ok(("pbcopy", &[]))
    } else if cfg!(target_os = "linux") {
        let session_type = std::env::var("XDG_SESSION_TYPE").unwrap_or_default();
        if session_type == "wayland" {
            Ok(("wl-copy", &[]))
        } else {
            Ok(("xclip", &["-selection", "clipboard"]))
        }
    } else {
        Err(ClipboardError::Unsupported)
    }
}

/// Copy text to the system clipboard.
/// Uses pbcopy on macOS, wl-copy on Wayland, xclip on X11.
pub async fn copy_to_clipboard(text: &str) -> Result<(), ClipboardError> {
    let (cmd, args) = clipboard_command()?;

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ClipboardError::Spawn(cmd, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ClipboardError::Write(cmd, e))?;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| ClipboardError::Write(cmd, e))?;
    if !status.success() {
        return Err(ClipboardError::Exit(cmd, status));
    }

    Ok(())
}
