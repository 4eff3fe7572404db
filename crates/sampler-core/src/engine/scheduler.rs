use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_SUBMIT_PROGRAM: &str = "sbatch";
pub const DEFAULT_SUBMIT_SCRIPT: &str = "../submit_walkers.sh";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Cannot submit an empty job array")]
    EmptyArray,
    #[error("Failed to launch '{program}' in {workdir}: {source}")]
    Spawn {
        program: String,
        workdir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exited with status {status}")]
    Failed { command: String, status: String },
}

/// Launches the walker simulations of an iteration.
pub trait Scheduler {
    /// Submits `size` indexed tasks, numbered `0..size`, from `workdir`.
    fn submit_array(&self, workdir: &Path, size: usize) -> Result<(), SchedulerError>;
}

/// Submits job arrays to SLURM with `sbatch --array=0-{N-1} <script>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmScheduler {
    pub program: String,
    /// Submission script, relative to the iteration directory.
    pub script: String,
}

impl Default for SlurmScheduler {
    fn default() -> Self {
        Self {
            program: DEFAULT_SUBMIT_PROGRAM.to_string(),
            script: DEFAULT_SUBMIT_SCRIPT.to_string(),
        }
    }
}

impl SlurmScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }
}

impl Scheduler for SlurmScheduler {
    fn submit_array(&self, workdir: &Path, size: usize) -> Result<(), SchedulerError> {
        if size == 0 {
            return Err(SchedulerError::EmptyArray);
        }
        let array = format!("--array=0-{}", size - 1);
        let command = format!("{} {} {}", self.program, array, self.script);
        info!("Submitting '{}' in {}", command, workdir.display());

        let status = Command::new(&self.program)
            .arg(&array)
            .arg(&self.script)
            .current_dir(workdir)
            .status()
            .map_err(|source| SchedulerError::Spawn {
                program: self.program.clone(),
                workdir: workdir.to_path_buf(),
                source,
            })?;
        if !status.success() {
            return Err(SchedulerError::Failed {
                command,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_targets_sbatch_and_shared_script() {
        let scheduler = SlurmScheduler::new();
        assert_eq!(scheduler.program, "sbatch");
        assert_eq!(scheduler.script, "../submit_walkers.sh");
    }

    #[test]
    fn empty_array_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SlurmScheduler::new().submit_array(dir.path(), 0),
            Err(SchedulerError::EmptyArray)
        ));
    }

    #[test]
    fn exit_status_and_spawn_failures_are_reported() {
        let dir = tempdir().unwrap();
        assert!(
            SlurmScheduler::new()
                .with_program("true")
                .submit_array(dir.path(), 4)
                .is_ok()
        );
        assert!(matches!(
            SlurmScheduler::new()
                .with_program("false")
                .submit_array(dir.path(), 4),
            Err(SchedulerError::Failed { .. })
        ));
        assert!(matches!(
            SlurmScheduler::new()
                .with_program("definitely-not-a-scheduler")
                .submit_array(dir.path(), 4),
            Err(SchedulerError::Spawn { .. })
        ));
    }
}
