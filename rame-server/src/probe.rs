//! Media metadata probing
//!
//! The scanner resolves every media item through a [`MediaProbe`]. The default
//! implementation reads container tags and properties with lofty.
//!
//! Extracts:
//! - Title tag
//! - Duration

use async_trait::async_trait;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Probe errors
///
/// These stay inside a scan job: the item is left unresolved.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// File could not be parsed as media
    #[error("Failed to read media: {0}")]
    Unreadable(String),

    /// Item refers to a storage that is not configured
    #[error("Unknown storage: {0}")]
    UnknownStorage(String),

    /// Probe did not answer in time
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error (file read)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata produced by a successful probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    /// Title tag, when the file carries one
    pub title: Option<String>,
    pub duration: Duration,
}

/// Extracts `{title, duration}` for a media location
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe the media at `location` (as resolved by its storage)
    async fn probe(&self, location: &str) -> Result<ProbeResult, ProbeError>;
}

/// Probe backed by lofty tag parsing
///
/// Tag reads run on the blocking pool. A caller that times out only stops
/// waiting; the read itself runs to completion and keeps its permit until
/// then, so at most `max_in_flight` reads ever occupy blocking threads.
#[derive(Debug, Clone)]
pub struct LoftyProbe {
    permits: Arc<Semaphore>,
}

impl LoftyProbe {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Read tags and properties synchronously
    pub fn probe_file(path: &Path) -> Result<ProbeResult, ProbeError> {
        if !path.is_file() {
            return Err(ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            )));
        }

        let tagged_file = Probe::open(path)
            .map_err(|e| ProbeError::Unreadable(e.to_string()))?
            .read()
            .map_err(|e| ProbeError::Unreadable(e.to_string()))?;

        let duration = tagged_file.properties().duration();

        let title = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .and_then(|tag| tag.title().map(|s| s.to_string()))
            .filter(|title| !title.trim().is_empty());

        tracing::debug!(
            file = %path.display(),
            title = ?title,
            duration_s = duration.as_secs_f64(),
            "Extracted metadata"
        );

        Ok(ProbeResult { title, duration })
    }
}

#[async_trait]
impl MediaProbe for LoftyProbe {
    async fn probe(&self, location: &str) -> Result<ProbeResult, ProbeError> {
        let path = PathBuf::from(location);
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ProbeError::Unreadable(format!("probe closed: {}", e)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            Self::probe_file(&path)
        })
        .await
        .map_err(|e| ProbeError::Unreadable(format!("probe task failed: {}", e)))?
    }
}
