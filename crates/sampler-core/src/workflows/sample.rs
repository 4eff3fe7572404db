use crate::core::colvars::cv::CollectiveVariable;
use crate::core::colvars::evaluator;
use crate::core::io::fs::makedirs;
use crate::core::io::loader::{LoadRequest, TrajectorySource};
use crate::engine::config::{ConfigError, IterationConfig};
use crate::engine::controller::IterationController;
use crate::engine::error::EngineError;
use crate::engine::polling::CancellationToken;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scheduler::Scheduler;
use crate::engine::state::IterationOutcome;
use nalgebra::DVector;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, instrument};

/// Whether iterations are executed or only evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Submit walkers, wait for them and stage every next iteration.
    #[default]
    Server,
    /// Evaluate already finished iterations, stopping at the first one that is
    /// missing or incomplete.
    Convergence,
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartMode::Server => f.write_str("server"),
            StartMode::Convergence => f.write_str("convergence"),
        }
    }
}

impl FromStr for StartMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(StartMode::Server),
            "convergence" => Ok(StartMode::Convergence),
            other => Err(ConfigError::InvalidValue {
                parameter: "start_mode",
                message: format!("'{other}' is not supported (expected 'server' or 'convergence')"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Settings of the first iteration; later iterations only change the number.
    pub iteration: IterationConfig,
    pub start_mode: StartMode,
    /// Last iteration to run, inclusive.
    pub max_iteration: usize,
    /// File pattern of the starting structure, relative to the working directory.
    pub starting_structure: String,
    /// Identifier used in the convergence history file name.
    pub simu_id: String,
}

impl SamplingConfig {
    pub fn history_path(&self) -> PathBuf {
        self.iteration
            .working_dir
            .join(format!("convergence_{}.csv", self.simu_id))
    }
}

/// Distance between two consecutive swarm centers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceRecord {
    pub from: String,
    pub to: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingResult {
    /// Outcomes of the iterations run in server mode.
    pub outcomes: Vec<IterationOutcome>,
    /// Center of the starting structure followed by each evaluated iteration's center.
    pub center_points: Vec<DVector<f64>>,
    /// Iterations that were evaluated, in order.
    pub iterations: Vec<usize>,
    pub history: Vec<ConvergenceRecord>,
    pub history_path: PathBuf,
}

#[instrument(skip_all, name = "sampling_workflow")]
pub fn run(
    config: &SamplingConfig,
    cvs: &[CollectiveVariable],
    scheduler: &dyn Scheduler,
    source: &dyn TrajectorySource,
    reporter: &ProgressReporter,
    cancel: Option<&CancellationToken>,
) -> Result<SamplingResult, EngineError> {
    info!(
        "Starting {} sampling from iteration {} to {} with {} walkers",
        config.start_mode,
        config.iteration.iteration,
        config.max_iteration,
        config.iteration.swarm_size
    );
    let starting_center = starting_center(config, cvs, source)?;
    let mut center_points = vec![starting_center];
    let mut iterations = Vec::new();
    let mut outcomes = Vec::new();

    for iteration in config.iteration.iteration..=config.max_iteration {
        let iteration_config = config.iteration.for_iteration(iteration);
        let mut controller =
            IterationController::new(&iteration_config, cvs, scheduler, source, reporter);
        if let Some(token) = cancel {
            controller = controller.with_cancellation(token.clone());
        }
        reporter.report(Progress::Message(format!("Iteration {iteration}")));

        let center = match config.start_mode {
            StartMode::Server => {
                if controller.simulations_finished() {
                    info!("Simulation of iteration {iteration} already finished from before.");
                }
                makedirs(&iteration_config.iteration_dir(), false, true)?;
                let outcome = controller.run()?;
                let center = outcome.center.clone();
                outcomes.push(outcome);
                center
            }
            StartMode::Convergence => {
                if !iteration_config.iteration_dir().exists() {
                    info!("No simulation files for iteration {iteration}. Stopping.");
                    break;
                }
                if !controller.simulations_finished() {
                    info!("Simulation not finished for iteration {iteration}. Stopping.");
                    break;
                }
                info!("Computing convergence");
                controller.compute_center_distances()?.center
            }
        };
        center_points.push(center);
        iterations.push(iteration);
        info!("Finished with iteration {iteration}.");
    }

    let history = convergence_history(&center_points, &iterations);
    let history_path = config.history_path();
    write_history(&history_path, &history)?;
    info!("Max iteration reached. Finished.");

    Ok(SamplingResult {
        outcomes,
        center_points,
        iterations,
        history,
        history_path,
    })
}

/// Mean CV vector of the starting structure.
fn starting_center(
    config: &SamplingConfig,
    cvs: &[CollectiveVariable],
    source: &dyn TrajectorySource,
) -> Result<DVector<f64>, EngineError> {
    let request = LoadRequest::new(
        &config.iteration.working_dir,
        None,
        config.starting_structure.clone(),
    )
    .with_center_and_align(false);
    let structure = source
        .load(&request)
        .map_err(EngineError::StartingStructure)?;
    if structure.is_empty() {
        return Err(EngineError::EmptyTrajectory { walker: 0 });
    }
    let evals = evaluator::evaluate(cvs, &structure)?;
    Ok(evals.row_mean().transpose())
}

/// Distances between consecutive centers. The first center is that of the
/// starting structure, labelled `in`.
pub fn convergence_history(
    center_points: &[DVector<f64>],
    iterations: &[usize],
) -> Vec<ConvergenceRecord> {
    center_points
        .windows(2)
        .zip(iterations)
        .enumerate()
        .map(|(idx, (pair, &iteration))| ConvergenceRecord {
            from: if idx == 0 {
                "in".to_string()
            } else {
                iterations[idx - 1].to_string()
            },
            to: iteration.to_string(),
            distance: (&pair[1] - &pair[0]).norm(),
        })
        .collect()
}

fn write_history(path: &Path, history: &[ConvergenceRecord]) -> Result<(), EngineError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in history {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote convergence history to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::gro::{GroFile, GroMetadata};
    use crate::core::io::loader::GroTrajectorySource;
    use crate::core::io::traits::TrajectoryFile;
    use crate::core::io::xtc::XtcFile;
    use crate::engine::config::IterationConfigBuilder;
    use crate::engine::controller::tests::{
        DimerSource, RecordingScheduler, contact_cvs, dimer,
    };
    use crate::engine::polling::PollPolicy;
    use crate::engine::reweight::ExplorationPolicy;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn sampling_config(root: &Path, start: usize, max: usize, mode: StartMode) -> SamplingConfig {
        SamplingConfig {
            iteration: IterationConfigBuilder::new()
                .working_dir(root.to_path_buf())
                .iteration(start)
                .swarm_size(2)
                .policy(ExplorationPolicy::SingleState)
                .poll(PollPolicy::fixed(Duration::from_millis(1)))
                .build()
                .unwrap(),
            start_mode: mode,
            max_iteration: max,
            starting_structure: "equilibrated.gro".into(),
            simu_id: "ss".into(),
        }
    }

    fn source() -> DimerSource {
        let mut source = DimerSource::with_walkers(&[&[1.0, 2.0], &[1.0, 4.0]]);
        source
            .separations
            .insert("equilibrated.gro".into(), vec![1.0]);
        source
    }

    fn prepare_iteration(root: &Path, iteration: usize, finished: bool) {
        let dir = root.join(iteration.to_string());
        fs::create_dir_all(&dir).unwrap();
        for i in 0..2 {
            fs::write(dir.join(format!("s{i}.gro")), "structure").unwrap();
            if finished {
                fs::write(dir.join(format!("s{i}.done")), "").unwrap();
            }
        }
    }

    #[test]
    fn convergence_mode_stops_at_first_missing_iteration() {
        let dir = tempdir().unwrap();
        prepare_iteration(dir.path(), 1, true);
        prepare_iteration(dir.path(), 2, true);
        let config = sampling_config(dir.path(), 1, 10, StartMode::Convergence);
        let scheduler = RecordingScheduler::default();

        let result = run(
            &config,
            &contact_cvs(),
            &scheduler,
            &source(),
            &ProgressReporter::new(),
            None,
        )
        .unwrap();
        assert_eq!(result.iterations, vec![1, 2]);
        assert_eq!(result.center_points.len(), 3);
        assert!(result.outcomes.is_empty());
        assert_eq!(scheduler.submissions.get(), 0);

        assert!((result.center_points[0][0] - 1.0).abs() < 1e-12);
        assert!((result.center_points[1][0] - 2.0).abs() < 1e-12);
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.history[0].from, "in");
        assert_eq!(result.history[1].from, "1");
        assert_eq!(result.history[1].to, "2");
        assert!((result.history[0].distance - 1.0).abs() < 1e-12);

        let csv = fs::read_to_string(dir.path().join("convergence_ss.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("from,to,distance"));
        assert_eq!(lines.next(), Some("in,1,1.0"));
    }

    #[test]
    fn convergence_mode_stops_at_unfinished_iteration() {
        let dir = tempdir().unwrap();
        prepare_iteration(dir.path(), 1, false);
        let config = sampling_config(dir.path(), 1, 3, StartMode::Convergence);
        let result = run(
            &config,
            &contact_cvs(),
            &RecordingScheduler::default(),
            &source(),
            &ProgressReporter::new(),
            None,
        )
        .unwrap();
        assert!(result.iterations.is_empty());
        assert_eq!(result.center_points.len(), 1);
        assert!(result.history_path.exists());
    }

    #[test]
    fn server_mode_runs_iterations_and_stages_seeds() {
        let dir = tempdir().unwrap();
        prepare_iteration(dir.path(), 3, true);
        let config = sampling_config(dir.path(), 3, 3, StartMode::Server);
        let scheduler = RecordingScheduler::default();

        let result = run(
            &config,
            &contact_cvs(),
            &scheduler,
            &source(),
            &ProgressReporter::new(),
            None,
        )
        .unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].replicas.iter().sum::<usize>(), 2);
        assert_eq!(scheduler.submissions.get(), 0);
        assert!(dir.path().join("4").join("in-0.gro").exists());
        assert!(dir.path().join("4").join("in-1.gro").exists());
    }

    #[test]
    fn cancelled_server_run_surfaces_cancellation() {
        let dir = tempdir().unwrap();
        prepare_iteration(dir.path(), 1, false);
        let config = sampling_config(dir.path(), 1, 2, StartMode::Server);
        let scheduler = RecordingScheduler::default();
        let token = CancellationToken::new();
        token.cancel();

        let result = run(
            &config,
            &contact_cvs(),
            &scheduler,
            &source(),
            &ProgressReporter::new(),
            Some(&token),
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(scheduler.submissions.get(), 1);
    }

    #[test]
    fn starting_structure_is_loaded_from_real_gro_file() {
        let dir = tempdir().unwrap();
        GroFile::write_to_path(
            &dimer(&[2.5]),
            &GroMetadata::default(),
            dir.path().join("equilibrated.gro"),
        )
        .unwrap();
        let config = sampling_config(dir.path(), 1, 1, StartMode::Convergence);
        let center = starting_center(
            &config,
            &contact_cvs(),
            &GroTrajectorySource,
        )
        .unwrap();
        assert!((center[0] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn server_mode_reads_default_xtc_walker_files() {
        let dir = tempdir().unwrap();
        let iteration_dir = dir.path().join("1");
        fs::create_dir_all(&iteration_dir).unwrap();
        GroFile::write_to_path(
            &dimer(&[1.0]),
            &GroMetadata::default(),
            dir.path().join("equilibrated.gro"),
        )
        .unwrap();
        for (i, separations) in [[1.0, 1.2], [1.0, 3.0]].iter().enumerate() {
            let walker = dimer(separations);
            GroFile::write_to_path(
                &dimer(&separations[1..]),
                &GroMetadata::default(),
                iteration_dir.join(format!("s{i}.gro")),
            )
            .unwrap();
            XtcFile::write_frames(&iteration_dir.join(format!("s{i}.xtc")), walker.frames())
                .unwrap();
            fs::write(iteration_dir.join(format!("s{i}.done")), "").unwrap();
        }
        let config = sampling_config(dir.path(), 1, 1, StartMode::Server);
        let scheduler = RecordingScheduler::default();

        let result = run(
            &config,
            &contact_cvs(),
            &scheduler,
            &GroTrajectorySource,
            &ProgressReporter::new(),
            None,
        )
        .unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].replicas.iter().sum::<usize>(), 2);
        assert!(dir.path().join("2").join("in-0.gro").exists());
    }

    #[test]
    fn start_mode_parses_known_names() {
        assert_eq!("server".parse::<StartMode>(), Ok(StartMode::Server));
        assert_eq!("convergence".parse::<StartMode>(), Ok(StartMode::Convergence));
        assert!("local".parse::<StartMode>().is_err());
    }
}
