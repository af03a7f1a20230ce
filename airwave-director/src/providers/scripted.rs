//! Timeline files from disk
//!
//! Cycles through every `*.json` file of a directory in name order. Useful
//! for rehearsals and for running the director without a model account.

use super::{ContentGenerator, GenerateRequest};
use crate::error::{Error, Result};
use airwave_common::Timeline;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

pub struct ScriptedGenerator {
    dir: PathBuf,
    next: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn timeline_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, _request: GenerateRequest) -> Result<Timeline> {
        let files = self.timeline_files().await?;
        if files.is_empty() {
            return Err(Error::Generation(format!(
                "no timeline files in {}",
                self.dir.display()
            )));
        }

        let index = self.next.fetch_add(1, Ordering::SeqCst) % files.len();
        let path = &files[index];
        debug!("Loading scripted timeline {}", path.display());

        let json = tokio::fs::read_to_string(path).await?;
        let mut timeline = Timeline::from_json(&json)
            .map_err(|e| Error::InvalidTimeline(format!("{}: {}", path.display(), e)))?;
        // Each airing is a distinct episode for cache scoping
        timeline.id = Uuid::new_v4().to_string();

        info!(title = %timeline.title, blocks = timeline.len(), "Scripted timeline loaded");
        Ok(timeline)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
