use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Port used when the PORT environment variable is absent.
pub const DEFAULT_PORT: u16 = 3001;

/// Maximum time to wait for the extractor's `--get-title` probe.
pub const TITLE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Kill a streaming extractor that produces no bytes for this long.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Internal read buffer requested from the extractor.
pub const EXTRACTOR_BUFFER_SIZE: &str = "16K";

/// Attachment filename used when title resolution fails.
pub const FALLBACK_TITLE: &str = "youtube-audio";

/// File extension appended to the attachment filename.
pub const AUDIO_FILE_EXTENSION: &str = "mp3";

/// Number of in-flight stdout chunks buffered between the pump and the
/// HTTP response. Small on purpose: the response's flow control should
/// reach the subprocess, not a large in-process queue.
pub const STREAM_CHANNEL_DEPTH: usize = 8;

/// Upstream release artifact for the extractor binary.
pub fn default_binary_source_url() -> String {
    if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe".to_string()
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp".to_string()
    }
}

fn default_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Top-level configuration for the relay server.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// TCP port the HTTP server listens on.
    pub port: u16,
    /// Local path of the extractor executable.
    pub binary_path: PathBuf,
    /// Upstream URL the extractor is provisioned from when absent.
    pub binary_source_url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        // The original deployment keeps the binary next to the server
        // executable; fall back to the working directory when the exe
        // path is unavailable.
        let binary_path = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(default_binary_name())))
            .unwrap_or_else(|| PathBuf::from(default_binary_name()));

        Self {
            port: DEFAULT_PORT,
            binary_path,
            binary_source_url: default_binary_source_url(),
        }
    }
}

impl RelayConfig {
    /// Build a config from the environment. Only PORT is honored; an
    /// unparseable value falls back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("PORT") {
            if let Ok(port) = raw.trim().parse::<u16>() {
                config.port = port;
            }
        }
        config
    }
}
