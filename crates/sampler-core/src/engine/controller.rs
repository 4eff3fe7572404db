use super::config::IterationConfig;
use super::error::EngineError;
use super::polling::CancellationToken;
use super::progress::{Progress, ProgressReporter};
use super::reweight::ReplicaReweighter;
use super::scheduler::Scheduler;
use super::state::{IterationOutcome, IterationState, SwarmEvaluation};
use crate::core::colvars::cv::CollectiveVariable;
use crate::core::colvars::evaluator;
use crate::core::io::fs::makedirs;
use crate::core::io::loader::{LoadRequest, TrajectorySource};
use nalgebra::{DMatrix, DVector};
use std::fs;
use tracing::{debug, error, info, instrument};

/// Runs one iteration of the swarm: submit, wait, evaluate, redistribute.
pub struct IterationController<'a> {
    config: &'a IterationConfig,
    cvs: &'a [CollectiveVariable],
    scheduler: &'a dyn Scheduler,
    source: &'a dyn TrajectorySource,
    reporter: &'a ProgressReporter<'a>,
    cancel: Option<CancellationToken>,
    state: IterationState,
}

impl<'a> IterationController<'a> {
    pub fn new(
        config: &'a IterationConfig,
        cvs: &'a [CollectiveVariable],
        scheduler: &'a dyn Scheduler,
        source: &'a dyn TrajectorySource,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            cvs,
            scheduler,
            source,
            reporter,
            cancel: None,
            state: IterationState::Pending,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn config(&self) -> &IterationConfig {
        self.config
    }

    /// Number of walkers whose completion sentinel exists.
    pub fn finished_walkers(&self) -> usize {
        let dir = self.config.iteration_dir();
        (0..self.config.swarm_size)
            .filter(|&i| dir.join(self.config.files.sentinel(i)).exists())
            .count()
    }

    /// Whether every walker has produced its sentinel. Does not change state.
    pub fn simulations_finished(&self) -> bool {
        let dir = self.config.iteration_dir();
        (0..self.config.swarm_size).all(|i| dir.join(self.config.files.sentinel(i)).exists())
    }

    /// Submits the walker array unless every walker has already finished.
    ///
    /// Returns whether a submission took place.
    pub fn submit_jobs(&mut self) -> Result<bool, EngineError> {
        if self.simulations_finished() {
            info!(
                "All {} walkers of iteration {} already finished, skipping submission",
                self.config.swarm_size, self.config.iteration
            );
            self.state = IterationState::Submitted;
            return Ok(false);
        }
        self.scheduler
            .submit_array(&self.config.iteration_dir(), self.config.swarm_size)?;
        self.state = IterationState::Submitted;
        Ok(true)
    }

    /// Blocks until every sentinel exists, following the configured poll policy.
    pub fn wait_for_completion(&mut self) -> Result<(), EngineError> {
        self.state = IterationState::WaitingForCompletion;
        info!("Waiting for completion of iteration {}", self.config.iteration);
        let total = self.config.swarm_size;
        let mut last_reported = None;
        let polls = self
            .config
            .poll
            .wait_until(self.cancel.as_ref(), || {
                let finished = self.finished_walkers();
                if last_reported != Some(finished) {
                    self.reporter
                        .report(Progress::WalkersFinished { finished, total });
                    last_reported = Some(finished);
                }
                finished == total
            })?;
        debug!("All walkers finished after {} polls", polls);
        Ok(())
    }

    /// Evaluates the CVs of every walker and measures each final frame's
    /// distance to the swarm center.
    pub fn compute_center_distances(&mut self) -> Result<SwarmEvaluation, EngineError> {
        self.state = IterationState::Evaluating;
        let evals = self.load_evals()?;

        let n_cvs = self.cvs.len();
        let n_frames: usize = evals.iter().map(|e| e.nrows()).sum();
        let mut center = DVector::zeros(n_cvs);
        for ev in &evals {
            for row in ev.row_iter() {
                center += row.transpose();
            }
        }
        center /= n_frames as f64;

        let distances = evals
            .iter()
            .map(|ev| {
                let endpoint = ev.row(ev.nrows() - 1).transpose();
                (&center - endpoint).norm()
            })
            .collect();
        Ok(SwarmEvaluation {
            center,
            distances,
            n_frames,
        })
    }

    fn load_evals(&self) -> Result<Vec<DMatrix<f64>>, EngineError> {
        let dir = self.config.iteration_dir();
        let files = &self.config.files;
        let load = &self.config.load;

        self.reporter.report(Progress::TaskStart {
            total_steps: self.config.swarm_size as u64,
        });
        let mut evals = Vec::with_capacity(self.config.swarm_size);
        for walker in 0..self.config.swarm_size {
            let request = LoadRequest::new(
                &dir,
                Some(files.trajectory(walker)),
                files.structure(walker),
            )
            .with_stride(load.stride)
            .with_query(load.query.clone())
            .with_center_and_align(load.center_and_align);
            let trajectory = self
                .source
                .load(&request)
                .map_err(|source| EngineError::Trajectory { walker, source })?;
            if trajectory.is_empty() {
                return Err(EngineError::EmptyTrajectory { walker });
            }
            evals.push(evaluator::evaluate(self.cvs, &trajectory)?);
            self.reporter.report(Progress::TaskIncrement);
        }
        self.reporter.report(Progress::TaskFinish);
        Ok(evals)
    }

    /// Reweights the walkers and stages the next iteration's seed structures.
    pub fn generate_replicas(&mut self, distances: &[f64]) -> Result<Vec<usize>, EngineError> {
        self.state = IterationState::Redistributing;
        let reweighter = ReplicaReweighter::new(self.config.swarm_size, self.config.policy);
        let replicas = reweighter.compute(distances)?;
        self.stage_replicas(&replicas)?;
        Ok(replicas)
    }

    /// Copies walker `i`'s final structure `replicas[i]` times into the next
    /// iteration directory, numbering seeds in walker order.
    ///
    /// Any existing next-iteration directory is backed up first.
    pub fn stage_replicas(&self, replicas: &[usize]) -> Result<usize, EngineError> {
        let dir = self.config.iteration_dir();
        let next_dir = self.config.next_iteration_dir();
        makedirs(&next_dir, true, true)?;

        let files = &self.config.files;
        let mut staged = 0;
        for (walker, &count) in replicas.iter().enumerate() {
            let source = dir.join(files.structure(walker));
            info!("Trajectory {walker} will seed {count} new replicas");
            for _ in 0..count {
                let target = next_dir.join(files.seed(staged));
                fs::copy(&source, &target).map_err(|source_err| EngineError::Io {
                    path: source.clone(),
                    source: source_err,
                })?;
                staged += 1;
            }
        }

        if staged != self.config.swarm_size {
            error!(
                "Reweighting tried to stage the wrong number of replicas ({staged}). \
                 Replicas: {replicas:?}"
            );
            return Err(EngineError::Staging {
                expected: self.config.swarm_size,
                staged,
            });
        }
        Ok(staged)
    }

    /// Runs the full iteration.
    #[instrument(skip_all, name = "iteration", fields(iteration = self.config.iteration))]
    pub fn run(&mut self) -> Result<IterationOutcome, EngineError> {
        self.reporter.report(Progress::PhaseStart { name: "Submitting" });
        self.submit_jobs()?;
        self.reporter.report(Progress::PhaseFinish);

        self.reporter.report(Progress::PhaseStart {
            name: "Waiting for walkers",
        });
        self.wait_for_completion()?;
        self.reporter.report(Progress::PhaseFinish);

        info!("Postprocessing iteration {}", self.config.iteration);
        self.reporter.report(Progress::PhaseStart {
            name: "Evaluating CVs",
        });
        let evaluation = self.compute_center_distances()?;
        self.reporter.report(Progress::PhaseFinish);

        self.reporter.report(Progress::PhaseStart {
            name: "Staging replicas",
        });
        let replicas = self.generate_replicas(&evaluation.distances)?;
        self.reporter.report(Progress::PhaseFinish);

        self.state = IterationState::Done;
        Ok(IterationOutcome {
            iteration: self.config.iteration,
            center: evaluation.center,
            distances: evaluation.distances,
            replicas,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::colvars::contact::{ContactCv, ContactScheme};
    use crate::core::colvars::cv::CvKind;
    use crate::core::io::loader::TrajectoryError;
    use crate::core::models::topology::Topology;
    use crate::core::models::trajectory::{Frame, Trajectory};
    use crate::engine::config::IterationConfigBuilder;
    use crate::engine::polling::PollPolicy;
    use crate::engine::reweight::ExplorationPolicy;
    use crate::engine::scheduler::SchedulerError;
    use nalgebra::Point3;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    pub(crate) struct RecordingScheduler {
        pub(crate) submissions: Cell<usize>,
        pub(crate) last_size: Cell<usize>,
    }

    impl Scheduler for RecordingScheduler {
        fn submit_array(&self, _workdir: &Path, size: usize) -> Result<(), SchedulerError> {
            self.submissions.set(self.submissions.get() + 1);
            self.last_size.set(size);
            Ok(())
        }
    }

    /// Serves dimer trajectories keyed by the requested structure file name.
    #[derive(Default)]
    pub(crate) struct DimerSource {
        pub(crate) separations: HashMap<String, Vec<f64>>,
        pub(crate) requests: RefCell<Vec<LoadRequest>>,
    }

    impl DimerSource {
        pub(crate) fn with_walkers(walkers: &[&[f64]]) -> Self {
            let separations = walkers
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("s{i}.gro"), s.to_vec()))
                .collect();
            Self {
                separations,
                requests: RefCell::default(),
            }
        }
    }

    pub(crate) fn dimer(separations: &[f64]) -> Trajectory {
        let mut top = Topology::new();
        top.push_atom("CA", "ALA", 1, 1);
        top.push_atom("CA", "GLY", 2, 2);
        let frames = separations
            .iter()
            .map(|&d| Frame::new(vec![Point3::origin(), Point3::new(d, 0.0, 0.0)], None))
            .collect();
        Trajectory::new(top, frames).unwrap()
    }

    impl TrajectorySource for DimerSource {
        fn load(&self, request: &LoadRequest) -> Result<Trajectory, TrajectoryError> {
            self.requests.borrow_mut().push(request.clone());
            let separations = self
                .separations
                .get(&request.topology_pattern)
                .ok_or_else(|| TrajectoryError::NoMatch {
                    directory: request.directory.clone(),
                    pattern: request.topology_pattern.clone(),
                })?;
            Ok(dimer(separations))
        }
    }

    pub(crate) fn contact_cvs() -> Vec<CollectiveVariable> {
        vec![CollectiveVariable::new("d").with_generator(CvKind::Contact(
            ContactCv::new(1, 2).with_scheme(ContactScheme::Ca),
        ))]
    }

    fn setup(swarm_size: usize, policy: ExplorationPolicy) -> (TempDir, IterationConfig) {
        let dir = tempdir().unwrap();
        let config = IterationConfigBuilder::new()
            .working_dir(dir.path().to_path_buf())
            .iteration(1)
            .swarm_size(swarm_size)
            .policy(policy)
            .poll(
                PollPolicy::fixed(Duration::from_millis(1))
                    .with_timeout(Some(Duration::from_millis(50))),
            )
            .build()
            .unwrap();
        fs::create_dir_all(config.iteration_dir()).unwrap();
        for i in 0..swarm_size {
            fs::write(
                config.iteration_dir().join(config.files.structure(i)),
                format!("walker {i}"),
            )
            .unwrap();
        }
        (dir, config)
    }

    fn finish_walkers(config: &IterationConfig, walkers: impl IntoIterator<Item = usize>) {
        for i in walkers {
            fs::write(config.iteration_dir().join(config.files.sentinel(i)), "").unwrap();
        }
    }

    #[test]
    fn submit_is_skipped_when_all_sentinels_exist() {
        let (_dir, config) = setup(4, ExplorationPolicy::SingleState);
        let scheduler = RecordingScheduler::default();
        let source = DimerSource::default();
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let mut controller =
            IterationController::new(&config, &cvs, &scheduler, &source, &reporter);

        finish_walkers(&config, 0..3);
        assert!(!controller.simulations_finished());
        assert!(controller.submit_jobs().unwrap());
        assert_eq!(scheduler.submissions.get(), 1);
        assert_eq!(scheduler.last_size.get(), 4);

        finish_walkers(&config, [3]);
        assert!(controller.simulations_finished());
        assert!(!controller.submit_jobs().unwrap());
        assert_eq!(scheduler.submissions.get(), 1);
        assert_eq!(controller.state(), IterationState::Submitted);
    }

    #[test]
    fn wait_times_out_while_walkers_are_missing() {
        let (_dir, config) = setup(2, ExplorationPolicy::SingleState);
        let scheduler = RecordingScheduler::default();
        let source = DimerSource::default();
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let mut controller =
            IterationController::new(&config, &cvs, &scheduler, &source, &reporter);

        finish_walkers(&config, [0]);
        assert!(matches!(
            controller.wait_for_completion(),
            Err(EngineError::Timeout { .. })
        ));
        finish_walkers(&config, [1]);
        controller.wait_for_completion().unwrap();
    }

    #[test]
    fn wait_stops_when_cancelled() {
        let (_dir, config) = setup(2, ExplorationPolicy::SingleState);
        let scheduler = RecordingScheduler::default();
        let source = DimerSource::default();
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let token = CancellationToken::new();
        token.cancel();
        let mut controller = IterationController::new(&config, &cvs, &scheduler, &source, &reporter)
            .with_cancellation(token);
        assert!(matches!(
            controller.wait_for_completion(),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn center_is_the_mean_over_all_frames_of_all_walkers() {
        let (_dir, config) = setup(2, ExplorationPolicy::SingleState);
        let scheduler = RecordingScheduler::default();
        let source = DimerSource::with_walkers(&[&[1.0, 3.0], &[2.0, 2.0, 8.0]]);
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let mut controller =
            IterationController::new(&config, &cvs, &scheduler, &source, &reporter);

        let evaluation = controller.compute_center_distances().unwrap();
        assert_eq!(evaluation.n_frames, 5);
        assert!((evaluation.center[0] - 3.2).abs() < 1e-12);
        assert!((evaluation.distances[0] - 0.2).abs() < 1e-12);
        assert!((evaluation.distances[1] - 4.8).abs() < 1e-12);

        let requests = source.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].trajectory_pattern.as_deref(), Some("s1.xtc"));
        assert!(requests.iter().all(|r| r.query.as_deref() == Some("protein")));
        assert!(requests.iter().all(|r| r.center_and_align));
    }

    #[test]
    fn staging_copies_each_walker_its_replica_count_in_order() {
        let (_dir, config) = setup(4, ExplorationPolicy::SingleState);
        let scheduler = RecordingScheduler::default();
        let source = DimerSource::default();
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let controller = IterationController::new(&config, &cvs, &scheduler, &source, &reporter);

        assert_eq!(controller.stage_replicas(&[2, 0, 1, 1]).unwrap(), 4);
        let next = config.next_iteration_dir();
        let contents: Vec<String> = (0..4)
            .map(|k| fs::read_to_string(next.join(config.files.seed(k))).unwrap())
            .collect();
        assert_eq!(contents, vec!["walker 0", "walker 0", "walker 2", "walker 3"]);
        assert!(!next.join(config.files.seed(4)).exists());
    }

    #[test]
    fn staging_the_wrong_number_of_replicas_is_fatal() {
        let (_dir, config) = setup(4, ExplorationPolicy::SingleState);
        let scheduler = RecordingScheduler::default();
        let source = DimerSource::default();
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let controller = IterationController::new(&config, &cvs, &scheduler, &source, &reporter);

        assert!(matches!(
            controller.stage_replicas(&[1, 0, 1, 1]),
            Err(EngineError::Staging {
                expected: 4,
                staged: 3
            })
        ));
    }

    #[test]
    fn run_completes_a_finished_iteration_without_resubmitting() {
        let (_dir, config) = setup(4, ExplorationPolicy::SingleState);
        finish_walkers(&config, 0..4);
        let scheduler = RecordingScheduler::default();
        let source =
            DimerSource::with_walkers(&[&[1.0, 1.0], &[1.0, 1.05], &[1.0, 6.0], &[1.0, 6.0]]);
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let mut controller =
            IterationController::new(&config, &cvs, &scheduler, &source, &reporter);

        let outcome = controller.run().unwrap();
        assert_eq!(scheduler.submissions.get(), 0);
        assert_eq!(controller.state(), IterationState::Done);
        assert_eq!(outcome.iteration, 1);
        assert_eq!(outcome.replicas.iter().sum::<usize>(), 4);
        let explored = outcome.replicas[0] + outcome.replicas[1];
        assert!(explored > outcome.replicas[2] + outcome.replicas[3]);
        let next = config.next_iteration_dir();
        assert!((0..4).all(|k| next.join(config.files.seed(k)).exists()));
    }

    #[test]
    fn staging_backs_up_an_existing_next_iteration() {
        let (dir, config) = setup(2, ExplorationPolicy::SingleState);
        let next = config.next_iteration_dir();
        fs::create_dir_all(&next).unwrap();
        fs::write(next.join("stale.gro"), "old").unwrap();

        let scheduler = RecordingScheduler::default();
        let source = DimerSource::default();
        let reporter = ProgressReporter::new();
        let cvs = contact_cvs();
        let controller = IterationController::new(&config, &cvs, &scheduler, &source, &reporter);
        controller.stage_replicas(&[1, 1]).unwrap();

        assert!(!next.join("stale.gro").exists());
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("2#"))
            .count();
        assert_eq!(backups, 1);
    }
}
