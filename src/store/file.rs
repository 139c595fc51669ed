// src/store/file.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::fs::{FileSystem, RealFileSystem};
use crate::store::{Checkpoint, CheckpointStore};
use crate::types::RunId;

/// Directory (under the state dir) holding one file per run.
pub const RUNS_DIR: &str = "runs";

const EXTENSION: &str = "toml";

/// Stores each run as `<state_dir>/runs/<run_id>.toml`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileCheckpointStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self::with_fs(state_dir, Arc::new(RealFileSystem))
    }

    pub fn with_fs(state_dir: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: state_dir,
            fs,
        }
    }

    fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    /// Path of the checkpoint file for `run_id`.
    pub fn path_for(&self, run_id: &RunId) -> Result<PathBuf> {
        let id = run_id.as_str();
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            bail!("run id '{}' is not usable as a file name", id);
        }
        Ok(self.runs_dir().join(format!("{id}.{EXTENSION}")))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        let path = self.path_for(run_id)?;
        if !self.fs.is_file(&path) {
            return Ok(None);
        }

        let contents = self.fs.read_to_string(&path)?;
        let checkpoint: Checkpoint = toml::from_str(&contents)
            .with_context(|| format!("parsing checkpoint file {:?}", path))?;

        if &checkpoint.run_id != run_id {
            bail!(
                "checkpoint file {:?} belongs to run '{}', not '{}'",
                path,
                checkpoint.run_id,
                run_id
            );
        }
        checkpoint.verify()?;

        debug!(run_id = %run_id, path = ?path, "loaded checkpoint (file)");
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.run_id)?;
        let contents = toml::to_string(checkpoint)
            .with_context(|| format!("serializing checkpoint for run '{}'", checkpoint.run_id))?;
        self.fs.write(&path, contents.as_bytes())?;
        info!(
            run_id = %checkpoint.run_id,
            waves = checkpoint.waves_completed,
            "stored checkpoint (file)"
        );
        Ok(())
    }

    fn remove(&self, run_id: &RunId) -> Result<()> {
        let path = self.path_for(run_id)?;
        if self.fs.exists(&path) {
            self.fs.remove_file(&path)?;
            info!(run_id = %run_id, "removed checkpoint (file)");
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<RunId>> {
        let dir = self.runs_dir();
        if !self.fs.exists(&dir) {
            return Ok(Vec::new());
        }

        let mut ids: Vec<RunId> = self
            .fs
            .read_dir(&dir)?
            .into_iter()
            .filter(|p| is_checkpoint_file(p))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(RunId::from))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

fn is_checkpoint_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
}
