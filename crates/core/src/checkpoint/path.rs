use std::io;
use std::path::{Path, PathBuf};

use cptsim_config::CheckpointConfig;

/// Decides where checkpoint files and SimPoint inputs live.
pub trait PathManager: std::fmt::Debug {
    /// Output path prefix for the current checkpoint. Parent directories exist on return.
    fn output_path(&self) -> io::Result<PathBuf>;
    /// Directory [`Self::output_path`] places the current checkpoint in.
    fn checkpoint_dir(&self) -> PathBuf;
    /// Directory holding `simpoints0` and `weights0`.
    fn simpoint_dir(&self) -> PathBuf;
    /// Moves on to the next checkpoint index.
    fn advance(&mut self);
    fn checkpoint_id(&self) -> u64;
}

/// Lays checkpoints out as `{output_dir}/{config_name}/{workload}/{id}/{workload}`.
#[derive(Debug, Clone)]
pub struct DirPathManager {
    output_dir: PathBuf,
    simpoint_root: PathBuf,
    config_name: String,
    workload: String,
    cpt_id: u64,
}

impl DirPathManager {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        simpoint_root: impl Into<PathBuf>,
        config_name: impl Into<String>,
        workload: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            simpoint_root: simpoint_root.into(),
            config_name: config_name.into(),
            workload: workload.into(),
            cpt_id: 0,
        }
    }

    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self::new(
            &config.output_dir,
            config.simpoint_dir.as_deref().unwrap_or("."),
            &config.config_name,
            &config.workload,
        )
    }
}

impl PathManager for DirPathManager {
    fn output_path(&self) -> io::Result<PathBuf> {
        let dir = self.checkpoint_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(&self.workload))
    }

    fn checkpoint_dir(&self) -> PathBuf {
        self.output_dir
            .join(&self.config_name)
            .join(&self.workload)
            .join(self.cpt_id.to_string())
    }

    fn simpoint_dir(&self) -> PathBuf {
        self.simpoint_root.join(Path::new(&self.workload))
    }

    fn advance(&mut self) {
        self.cpt_id += 1;
        tracing::debug!("Next checkpoint index: {}", self.cpt_id);
    }

    fn checkpoint_id(&self) -> u64 {
        self.cpt_id
    }
}
