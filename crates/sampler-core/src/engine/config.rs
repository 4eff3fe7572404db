use super::polling::PollPolicy;
use super::reweight::ExplorationPolicy;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("{0} is not a valid exploration type (expected 'single_state' or 'multi_state')")]
    UnknownExplorationPolicy(String),
    #[error("Invalid value for '{parameter}': {message}")]
    InvalidValue {
        parameter: &'static str,
        message: String,
    },
}

/// File name templates of an iteration directory. `{i}` is replaced by the
/// walker or seed index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerFiles {
    pub sentinel: String,
    pub trajectory: String,
    pub structure: String,
    pub seed: String,
}

impl Default for WalkerFiles {
    fn default() -> Self {
        Self {
            sentinel: "s{i}.done".into(),
            trajectory: "s{i}.xtc".into(),
            structure: "s{i}.gro".into(),
            seed: "in-{i}.gro".into(),
        }
    }
}

impl WalkerFiles {
    fn render(template: &str, index: usize) -> String {
        template.replace("{i}", &index.to_string())
    }

    pub fn sentinel(&self, walker: usize) -> String {
        Self::render(&self.sentinel, walker)
    }

    pub fn trajectory(&self, walker: usize) -> String {
        Self::render(&self.trajectory, walker)
    }

    pub fn structure(&self, walker: usize) -> String {
        Self::render(&self.structure, walker)
    }

    pub fn seed(&self, index: usize) -> String {
        Self::render(&self.seed, index)
    }
}

/// How walker trajectories are loaded before CV evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSettings {
    pub stride: usize,
    pub query: Option<String>,
    pub center_and_align: bool,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            stride: 1,
            query: Some("protein".into()),
            center_and_align: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationConfig {
    /// Root directory holding one subdirectory per iteration.
    pub working_dir: PathBuf,
    pub iteration: usize,
    pub swarm_size: usize,
    pub policy: ExplorationPolicy,
    pub files: WalkerFiles,
    pub poll: PollPolicy,
    pub load: LoadSettings,
}

impl IterationConfig {
    pub fn iteration_dir(&self) -> PathBuf {
        self.working_dir.join(self.iteration.to_string())
    }

    pub fn next_iteration_dir(&self) -> PathBuf {
        self.working_dir.join((self.iteration + 1).to_string())
    }

    /// The same configuration moved to another iteration.
    pub fn for_iteration(&self, iteration: usize) -> Self {
        Self {
            iteration,
            ..self.clone()
        }
    }
}

#[derive(Default)]
pub struct IterationConfigBuilder {
    working_dir: Option<PathBuf>,
    iteration: Option<usize>,
    swarm_size: Option<usize>,
    policy: Option<ExplorationPolicy>,
    files: Option<WalkerFiles>,
    poll: Option<PollPolicy>,
    load: Option<LoadSettings>,
}

impl IterationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_dir(mut self, path: PathBuf) -> Self {
        self.working_dir = Some(path);
        self
    }
    pub fn iteration(mut self, iteration: usize) -> Self {
        self.iteration = Some(iteration);
        self
    }
    pub fn swarm_size(mut self, size: usize) -> Self {
        self.swarm_size = Some(size);
        self
    }
    pub fn policy(mut self, policy: ExplorationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
    pub fn files(mut self, files: WalkerFiles) -> Self {
        self.files = Some(files);
        self
    }
    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = Some(poll);
        self
    }
    pub fn load(mut self, load: LoadSettings) -> Self {
        self.load = Some(load);
        self
    }

    pub fn build(self) -> Result<IterationConfig, ConfigError> {
        let swarm_size = self
            .swarm_size
            .ok_or(ConfigError::MissingParameter("swarm_size"))?;
        if swarm_size == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "swarm_size",
                message: "must be at least 1".into(),
            });
        }
        let load = self.load.unwrap_or_default();
        if load.stride == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "stride",
                message: "must be at least 1".into(),
            });
        }
        Ok(IterationConfig {
            working_dir: self
                .working_dir
                .ok_or(ConfigError::MissingParameter("working_dir"))?,
            iteration: self
                .iteration
                .ok_or(ConfigError::MissingParameter("iteration"))?,
            swarm_size,
            policy: self.policy.ok_or(ConfigError::MissingParameter("policy"))?,
            files: self.files.unwrap_or_default(),
            poll: self.poll.unwrap_or_default(),
            load,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> IterationConfigBuilder {
        IterationConfigBuilder::new()
            .working_dir(PathBuf::from("/runs/ss"))
            .iteration(3)
            .swarm_size(24)
            .policy(ExplorationPolicy::SingleState)
    }

    #[test]
    fn build_fills_defaults_and_derives_directories() {
        let config = builder().build().unwrap();
        assert_eq!(config.iteration_dir(), PathBuf::from("/runs/ss/3"));
        assert_eq!(config.next_iteration_dir(), PathBuf::from("/runs/ss/4"));
        assert_eq!(config.files, WalkerFiles::default());
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.load.query.as_deref(), Some("protein"));
        assert_eq!(config.for_iteration(7).iteration_dir(), PathBuf::from("/runs/ss/7"));
    }

    #[test]
    fn build_reports_missing_and_invalid_parameters() {
        assert_eq!(
            IterationConfigBuilder::new().swarm_size(4).build(),
            Err(ConfigError::MissingParameter("working_dir"))
        );
        assert!(matches!(
            builder().swarm_size(0).build(),
            Err(ConfigError::InvalidValue {
                parameter: "swarm_size",
                ..
            })
        ));
        let zero_stride = LoadSettings {
            stride: 0,
            ..LoadSettings::default()
        };
        assert!(builder().load(zero_stride).build().is_err());
    }

    #[test]
    fn walker_file_templates_substitute_index() {
        let files = WalkerFiles::default();
        assert_eq!(files.sentinel(3), "s3.done");
        assert_eq!(files.trajectory(0), "s0.xtc");
        assert_eq!(files.structure(12), "s12.gro");
        assert_eq!(files.seed(5), "in-5.gro");
    }
}
