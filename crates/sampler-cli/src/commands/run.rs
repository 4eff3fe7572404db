use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use statesampler::{
    core::{colvars::io::load_cvs, io::loader::GroTrajectorySource},
    engine::{polling::CancellationToken, progress::ProgressReporter},
    workflows,
};
use tracing::info;

pub async fn run(args: RunArgs, cancel: CancellationToken) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let config = build_config(&args)?;

    info!("Loading collective variables from {:?}", &config.cvs_path);
    let cvs = load_cvs(&config.cvs_path)?;
    info!("Loaded {} collective variables.", cvs.len());

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting {} sampling of '{}' in {} (iterations {}..={}, {} walkers)...",
        config.sampling.start_mode,
        config.sampling.simu_id,
        config.sampling.iteration.working_dir.display(),
        config.sampling.iteration.iteration,
        config.sampling.max_iteration,
        config.sampling.iteration.swarm_size,
    );

    let result = tokio::task::block_in_place(|| {
        workflows::sample::run(
            &config.sampling,
            &cvs,
            &config.scheduler,
            &GroTrajectorySource,
            &reporter,
            Some(&cancel),
        )
    })?;

    info!(
        "Workflow finished after {} evaluated iteration(s).",
        result.iterations.len()
    );
    for record in &result.history {
        println!(
            "  |c_{} - c_{}| = {:.4}",
            record.to, record.from, record.distance
        );
    }
    println!(
        "✓ Convergence history written to: {}",
        result.history_path.display()
    );

    Ok(())
}
