// Title resolution — best-effort metadata probe used to name the attachment.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{FALLBACK_TITLE, TITLE_RESOLVE_TIMEOUT};

/// Outcome of a title probe. Resolution fails soft: every failure mode maps
/// to `Fallback`, never to an error that could propagate into the streaming
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTitle {
    Resolved(String),
    Fallback,
}

impl ResolvedTitle {
    pub fn as_str(&self) -> &str {
        match self {
            ResolvedTitle::Resolved(title) => title,
            ResolvedTitle::Fallback => FALLBACK_TITLE,
        }
    }
}

/// Probe the extractor for a human-readable title.
///
/// Runs `<binary> --get-title <url>` non-interactively with a hard timeout.
/// Non-zero exit, empty output, spawn failure, or timeout all fall back to
/// the fixed default title.
pub async fn resolve_title(binary: &Path, url: &str) -> ResolvedTitle {
    resolve_title_with_timeout(binary, url, TITLE_RESOLVE_TIMEOUT).await
}

/// Same as [`resolve_title`] with an explicit probe deadline.
pub async fn resolve_title_with_timeout(
    binary: &Path,
    url: &str,
    deadline: Duration,
) -> ResolvedTitle {
    let probe = Command::new(binary)
        .arg("--get-title")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        // Timing out drops the probe future; that drop must take the
        // process with it, or every hung probe leaks an extractor.
        .kill_on_drop(true)
        .output();

    let output = match timeout(deadline, probe).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            warn!("title probe failed to run: {err}");
            return ResolvedTitle::Fallback;
        }
        Err(_) => {
            warn!("title probe timed out after {:?}, using fallback", deadline);
            return ResolvedTitle::Fallback;
        }
    };

    if !output.status.success() {
        debug!("title probe exited with {}", output.status);
        return ResolvedTitle::Fallback;
    }

    let title = sanitize_title(&String::from_utf8_lossy(&output.stdout));
    if title.is_empty() {
        return ResolvedTitle::Fallback;
    }

    ResolvedTitle::Resolved(title)
}

/// Strip characters unsafe for a filename, keeping word characters and
/// whitespace, then trim.
fn sanitize_title(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
