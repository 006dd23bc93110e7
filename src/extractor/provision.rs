// Extractor binary provisioning — at-most-once download and install of the extraction tool.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Lifecycle of the on-disk extractor binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    /// Binary is absent and no install has been attempted yet.
    Missing,
    /// An install is in flight; requests must fail fast, not queue.
    Provisioning,
    /// Binary is present and executable.
    Ready,
    /// The last install attempt failed; requests keep failing fast.
    Failed,
}

/// Owns the extractor binary's install lifecycle.
///
/// The binary is a process-wide singleton resource: downloaded at most once,
/// never updated automatically, never deleted. Concurrent first-time installs
/// are serialized behind a single in-process lock so racing requests share
/// one download effort.
pub struct BinaryProvisioner {
    path: PathBuf,
    source_url: String,
    client: reqwest::Client,
    state: RwLock<ProvisionState>,
    install_lock: Mutex<()>,
}

impl BinaryProvisioner {
    pub fn new(path: PathBuf, source_url: String) -> Self {
        let initial = if path.is_file() {
            ProvisionState::Ready
        } else {
            ProvisionState::Missing
        };

        Self {
            path,
            source_url,
            client: reqwest::Client::new(),
            state: RwLock::new(initial),
            install_lock: Mutex::new(()),
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.path
    }

    /// Current state. `Missing`/`Failed` re-check the filesystem so a binary
    /// installed out-of-band by an operator is picked up without a restart.
    pub fn state(&self) -> ProvisionState {
        let current = *self.state.read();
        match current {
            ProvisionState::Ready | ProvisionState::Provisioning => current,
            ProvisionState::Missing | ProvisionState::Failed => {
                if self.path.is_file() {
                    *self.state.write() = ProvisionState::Ready;
                    ProvisionState::Ready
                } else {
                    current
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ProvisionState::Ready
    }

    /// Download and install the binary if it is absent. Single-flight:
    /// callers that lose the race wait on the lock, then observe the
    /// winner's result instead of re-downloading.
    pub async fn ensure(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let _guard = self.install_lock.lock().await;
        if self.is_ready() {
            // An earlier effort installed the binary while we waited.
            return Ok(());
        }

        *self.state.write() = ProvisionState::Provisioning;
        match self.install().await {
            Ok(()) => {
                *self.state.write() = ProvisionState::Ready;
                info!("extractor binary installed at {}", self.path.display());
                Ok(())
            }
            Err(err) => {
                *self.state.write() = ProvisionState::Failed;
                error!("extractor provisioning failed: {err:#}");
                Err(err)
            }
        }
    }

    async fn install(&self) -> Result<()> {
        info!(
            "extractor binary missing, downloading from {}",
            self.source_url
        );

        let response = self
            .client
            .get(&self.source_url)
            .send()
            .await
            .context("requesting extractor artifact")?
            .error_for_status()
            .context("extractor artifact request rejected")?;

        let payload = response
            .bytes()
            .await
            .context("reading extractor artifact body")?;
        if payload.is_empty() {
            return Err(anyhow!("upstream returned an empty artifact"));
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        // Write to a sibling tmp file, then rename, so a half-written
        // binary is never observed at the final path.
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &payload)
            .await
            .with_context(|| format!("writing {}", tmp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .context("marking extractor binary executable")?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("installing {}", self.path.display()))?;

        Ok(())
    }
}
