//! Crawl progress persistence: a JSON file store for runs and an in-memory store for tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context};
use async_trait::async_trait;
use gallerist_core::CrawlProgress;
use tokio::fs;

use crate::write_atomic;

/// Durable home of the batch runner's progress record.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Returns an empty record when nothing was saved yet.
    async fn load(&self) -> anyhow::Result<CrawlProgress>;
    async fn save(&self, progress: &CrawlProgress) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileProgressStore {
    path: PathBuf,
}

impl JsonFileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProgressStore for JsonFileProgressStore {
    async fn load(&self) -> anyhow::Result<CrawlProgress> {
        let exists = fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking {}", self.path.display()))?;
        if !exists {
            return Ok(CrawlProgress::default());
        }
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }

    async fn save(&self, progress: &CrawlProgress) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(progress).context("serializing crawl progress")?;
        write_atomic(&self.path, &bytes).await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    state: Mutex<CrawlProgress>,
    saves: Mutex<usize>,
    fail_saves: AtomicBool,
}

impl InMemoryProgressStore {
    pub fn new(initial: CrawlProgress) -> Self {
        Self {
            state: Mutex::new(initial),
            ..Default::default()
        }
    }

    /// A store whose every save fails, for exercising fatal progress errors.
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_saves.store(true, Ordering::SeqCst);
        store
    }

    pub fn snapshot(&self) -> CrawlProgress {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn load(&self) -> anyhow::Result<CrawlProgress> {
        Ok(self.snapshot())
    }

    async fn save(&self, progress: &CrawlProgress) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("progress store is read-only");
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = progress.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
