use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use serde::Deserialize;
use statesampler::engine::config::{IterationConfigBuilder, LoadSettings, WalkerFiles};
use statesampler::engine::polling::PollPolicy;
use statesampler::engine::reweight::ExplorationPolicy;
use statesampler::engine::scheduler::SlurmScheduler;
use statesampler::workflows::sample::{SamplingConfig, StartMode};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CVS: &str = "cvs.json";
pub const DEFAULT_SIMU_ID: &str = "ss";
pub const DEFAULT_STARTING_STRUCTURE: &str = "equilibrated.gro";
pub const DEFAULT_SWARM_SIZE: usize = 24;
pub const DEFAULT_MAX_ITERATION: usize = 15;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSamplingSection {
    swarm_size: Option<usize>,
    exploration_type: Option<String>,
    start_mode: Option<String>,
    max_iteration: Option<usize>,
}

/// Durations are given in seconds.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPollingSection {
    interval: Option<f64>,
    max_interval: Option<f64>,
    backoff: Option<f64>,
    timeout: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSchedulerSection {
    program: Option<String>,
    script: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialFilesSection {
    sentinel: Option<String>,
    trajectory: Option<String>,
    structure: Option<String>,
    seed: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialLoadingSection {
    stride: Option<usize>,
    /// An empty query disables atom selection.
    query: Option<String>,
    center_and_align: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialSamplerConfig {
    working_dir: Option<PathBuf>,
    cvs: Option<PathBuf>,
    simu_id: Option<String>,
    starting_structure: Option<String>,
    sampling: Option<PartialSamplingSection>,
    polling: Option<PartialPollingSection>,
    scheduler: Option<PartialSchedulerSection>,
    files: Option<PartialFilesSection>,
    loading: Option<PartialLoadingSection>,
}

/// Everything the `run` command needs, fully resolved.
#[derive(Debug)]
pub struct AppConfig {
    pub cvs_path: PathBuf,
    pub scheduler: SlurmScheduler,
    pub sampling: SamplingConfig,
}

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let partial = match &args.config {
        Some(path) => PartialSamplerConfig::from_file(path)?,
        None => PartialSamplerConfig::default(),
    };
    let mut partial = partial.overlay_args(args);
    partial.apply_set_values(&args.set_values)?;
    partial.resolve(args.iteration)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        CliError::Config(format!(
            "'{}' must be a non-negative number of seconds, got {}",
            key, value
        ))
    })
}

impl PartialSamplerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Command-line flags take precedence over file values.
    fn overlay_args(mut self, args: &RunArgs) -> Self {
        fn overlay<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        overlay(&mut self.working_dir, &args.working_dir);
        overlay(&mut self.cvs, &args.cvs);
        overlay(&mut self.simu_id, &args.simu_id);
        overlay(&mut self.starting_structure, &args.starting_structure);

        let sampling = self.sampling.get_or_insert_with(Default::default);
        overlay(&mut sampling.swarm_size, &args.swarm_size);
        overlay(&mut sampling.exploration_type, &args.exploration_type);
        overlay(&mut sampling.start_mode, &args.start_mode);
        overlay(&mut sampling.max_iteration, &args.max_iteration);

        let polling = self.polling.get_or_insert_with(Default::default);
        overlay(&mut polling.interval, &args.poll_interval);
        overlay(&mut polling.timeout, &args.timeout);

        let scheduler = self.scheduler.get_or_insert_with(Default::default);
        overlay(&mut scheduler.script, &args.submit_script);

        let files = self.files.get_or_insert_with(Default::default);
        overlay(&mut files.trajectory, &args.trajectory_pattern);
        self
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "working-dir" => self.working_dir = Some(PathBuf::from(value)),
                "cvs" => self.cvs = Some(PathBuf::from(value)),
                "simu-id" => self.simu_id = Some(value.to_string()),
                "starting-structure" => self.starting_structure = Some(value.to_string()),
                "sampling.swarm-size" => {
                    self.sampling.get_or_insert_with(Default::default).swarm_size =
                        Some(parse_value(key, value)?);
                }
                "sampling.exploration-type" => {
                    self.sampling
                        .get_or_insert_with(Default::default)
                        .exploration_type = Some(value.to_string());
                }
                "sampling.start-mode" => {
                    self.sampling.get_or_insert_with(Default::default).start_mode =
                        Some(value.to_string());
                }
                "sampling.max-iteration" => {
                    self.sampling
                        .get_or_insert_with(Default::default)
                        .max_iteration = Some(parse_value(key, value)?);
                }
                "polling.interval" => {
                    self.polling.get_or_insert_with(Default::default).interval =
                        Some(parse_value(key, value)?);
                }
                "polling.max-interval" => {
                    self.polling.get_or_insert_with(Default::default).max_interval =
                        Some(parse_value(key, value)?);
                }
                "polling.backoff" => {
                    self.polling.get_or_insert_with(Default::default).backoff =
                        Some(parse_value(key, value)?);
                }
                "polling.timeout" => {
                    self.polling.get_or_insert_with(Default::default).timeout =
                        Some(parse_value(key, value)?);
                }
                "scheduler.program" => {
                    self.scheduler.get_or_insert_with(Default::default).program =
                        Some(value.to_string());
                }
                "scheduler.script" => {
                    self.scheduler.get_or_insert_with(Default::default).script =
                        Some(value.to_string());
                }
                "files.sentinel" => {
                    self.files.get_or_insert_with(Default::default).sentinel =
                        Some(value.to_string());
                }
                "files.trajectory" => {
                    self.files.get_or_insert_with(Default::default).trajectory =
                        Some(value.to_string());
                }
                "files.structure" => {
                    self.files.get_or_insert_with(Default::default).structure =
                        Some(value.to_string());
                }
                "files.seed" => {
                    self.files.get_or_insert_with(Default::default).seed = Some(value.to_string());
                }
                "loading.stride" => {
                    self.loading.get_or_insert_with(Default::default).stride =
                        Some(parse_value(key, value)?);
                }
                "loading.query" => {
                    self.loading.get_or_insert_with(Default::default).query =
                        Some(value.to_string());
                }
                "loading.center-and-align" => {
                    self.loading
                        .get_or_insert_with(Default::default)
                        .center_and_align = Some(parse_value(key, value)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn resolve(self, iteration: usize) -> Result<AppConfig> {
        let working_dir = self.working_dir.ok_or_else(|| {
            CliError::Config(
                "A working directory is required either in the config file or via --working-dir."
                    .to_string(),
            )
        })?;
        let sampling = self.sampling.unwrap_or_default();
        let polling = self.polling.unwrap_or_default();
        let scheduler = self.scheduler.unwrap_or_default();
        let files = self.files.unwrap_or_default();
        let loading = self.loading.unwrap_or_default();

        let policy = match sampling.exploration_type {
            Some(name) => {
                ExplorationPolicy::from_str(&name).map_err(|e| CliError::Config(e.to_string()))?
            }
            None => ExplorationPolicy::default(),
        };
        let start_mode = match sampling.start_mode {
            Some(name) => StartMode::from_str(&name).map_err(|e| CliError::Config(e.to_string()))?,
            None => StartMode::default(),
        };

        let poll = Self::merge_polling(polling)?;

        let default_files = WalkerFiles::default();
        let walker_files = WalkerFiles {
            sentinel: files.sentinel.unwrap_or(default_files.sentinel),
            trajectory: files.trajectory.unwrap_or(default_files.trajectory),
            structure: files.structure.unwrap_or(default_files.structure),
            seed: files.seed.unwrap_or(default_files.seed),
        };

        let default_load = LoadSettings::default();
        let load = LoadSettings {
            stride: loading.stride.unwrap_or(default_load.stride),
            query: match loading.query {
                Some(query) if query.trim().is_empty() => None,
                Some(query) => Some(query),
                None => default_load.query,
            },
            center_and_align: loading
                .center_and_align
                .unwrap_or(default_load.center_and_align),
        };

        let iteration_config = IterationConfigBuilder::new()
            .working_dir(working_dir)
            .iteration(iteration)
            .swarm_size(sampling.swarm_size.unwrap_or(DEFAULT_SWARM_SIZE))
            .policy(policy)
            .files(walker_files)
            .poll(poll)
            .load(load)
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let mut slurm = SlurmScheduler::new();
        if let Some(program) = scheduler.program {
            slurm = slurm.with_program(program);
        }
        if let Some(script) = scheduler.script {
            slurm = slurm.with_script(script);
        }

        Ok(AppConfig {
            cvs_path: self.cvs.unwrap_or_else(|| PathBuf::from(DEFAULT_CVS)),
            scheduler: slurm,
            sampling: SamplingConfig {
                iteration: iteration_config,
                start_mode,
                max_iteration: sampling.max_iteration.unwrap_or(DEFAULT_MAX_ITERATION),
                starting_structure: self
                    .starting_structure
                    .unwrap_or_else(|| DEFAULT_STARTING_STRUCTURE.to_string()),
                simu_id: self.simu_id.unwrap_or_else(|| DEFAULT_SIMU_ID.to_string()),
            },
        })
    }

    fn merge_polling(partial: PartialPollingSection) -> Result<PollPolicy> {
        let defaults = PollPolicy::default();
        let interval = match partial.interval {
            Some(value) => seconds("polling.interval", value)?,
            None => defaults.interval,
        };
        let max_interval = match partial.max_interval {
            Some(value) => seconds("polling.max-interval", value)?,
            None => interval.max(defaults.max_interval),
        };
        let backoff = partial.backoff.unwrap_or(defaults.backoff);
        if !(backoff >= 1.0) {
            return Err(CliError::Config(format!(
                "'polling.backoff' must be at least 1.0, got {}",
                backoff
            )));
        }
        let timeout = partial
            .timeout
            .map(|value| seconds("polling.timeout", value))
            .transpose()?;

        Ok(PollPolicy::fixed(interval)
            .with_backoff(backoff, max_interval)
            .with_timeout(timeout))
    }
}
