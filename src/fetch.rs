//! Per-item fetch execution
//!
//! A fetch job navigates a worker session to the item's page, writes the
//! extracted content as an identifier-named artifact, and records the item
//! in the dedup index. The artifact is written before the index record, so
//! the only ambiguous crash state is an artifact without a record, which the
//! filter's secondary guard resolves without re-fetching.

use crate::crawler::Item;
use crate::driver::{DriverError, SessionDriver};
use crate::index::{IndexError, IndexStore};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while executing a fetch job
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state every fetch job needs: the index and the artifact directory
pub struct FetchContext {
    index: Arc<dyn IndexStore>,
    save_dir: PathBuf,
}

impl FetchContext {
    pub fn new(index: Arc<dyn IndexStore>, save_dir: PathBuf) -> Self {
        Self { index, save_dir }
    }

    pub fn index(&self) -> &dyn IndexStore {
        &*self.index
    }

    /// Path of the artifact for an item identifier
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.save_dir.join(format!("{}.md", id))
    }

    /// Secondary dedup guard: does the artifact already exist on disk?
    pub fn artifact_exists(&self, id: &str) -> bool {
        self.artifact_path(id).exists()
    }
}

/// Fetches one item and records it
///
/// On success the artifact exists and the index holds a record for the item.
/// On failure nothing is recorded, leaving the identifier eligible for
/// retry on a future discovery pass.
pub async fn run_job(
    session: &dyn SessionDriver,
    item: &Item,
    ctx: &FetchContext,
) -> Result<PathBuf, FetchError> {
    tracing::debug!("Fetching item {} from {}", item.id, item.url);

    let text = session.page_text(&item.url).await?;

    let path = ctx.artifact_path(&item.id);
    tokio::fs::write(&path, &text).await?;

    let location = path.to_string_lossy().into_owned();
    match ctx
        .index
        .insert(&item.id, Utc::now().timestamp(), Some(&location))
    {
        Ok(()) => {}
        // A concurrent or earlier fetch already recorded this id; the
        // artifact on disk is equivalent either way.
        Err(IndexError::DuplicateKey(_)) => {
            tracing::debug!("Item {} was already indexed", item.id);
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!("Fetched item {} -> {}", item.id, path.display());
    Ok(path)
}
