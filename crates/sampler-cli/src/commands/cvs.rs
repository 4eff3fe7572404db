use crate::cli::{CvsArgs, CvsCommands};
use crate::error::Result;
use statesampler::core::colvars::{
    cv::CollectiveVariable,
    evaluator::normalize_cvs,
    io::{load_cvs, save_cvs},
};
use statesampler::core::io::loader::{GroTrajectorySource, LoadRequest, TrajectorySource};
use std::path::{Path, PathBuf};
use tracing::info;

pub async fn run(args: CvsArgs) -> Result<()> {
    match args.command {
        CvsCommands::Show { path } => handle_show(&path),
        CvsCommands::Normalize {
            path,
            directory,
            trajectory,
            topology,
            stride,
            query,
            output,
        } => {
            let request = LoadRequest::new(directory, Some(trajectory), topology)
                .with_stride(stride)
                .with_query(Some(query).filter(|q| !q.trim().is_empty()));
            handle_normalize(&path, &request, output)
        }
    }
}

fn handle_show(path: &Path) -> Result<()> {
    let cvs = load_cvs(path)?;
    println!("{} collective variable(s) in {}", cvs.len(), path.display());
    for line in describe(&cvs) {
        println!("{}", line);
    }
    Ok(())
}

fn describe(cvs: &[CollectiveVariable]) -> Vec<String> {
    cvs.iter()
        .map(|cv| {
            let class = cv.generator().map_or("-", |g| g.class_name());
            let normalization = cv.normalization();
            let importance = cv
                .importance()
                .map_or_else(|| "-".to_string(), |i| format!("{i:.3}"));
            format!(
                "  {:<16} {:<24} {:<18} scale={:<12.6} offset={:<12.6} importance={}",
                cv.id(),
                cv.name(),
                class,
                normalization.scale,
                normalization.offset,
                importance
            )
        })
        .collect()
}

fn handle_normalize(path: &Path, request: &LoadRequest, output: Option<PathBuf>) -> Result<()> {
    let cvs = load_cvs(path)?;
    info!(
        "Loading trajectories matching '{}' from {:?}",
        request.trajectory_pattern.as_deref().unwrap_or_default(),
        &request.directory
    );
    let trajectory = tokio::task::block_in_place(|| GroTrajectorySource.load(request))?;
    println!(
        "Fitting {} CV(s) on {} frame(s)...",
        cvs.len(),
        trajectory.n_frames()
    );

    let normalized = normalize_cvs(&cvs, std::slice::from_ref(&trajectory))?;
    let output = output.unwrap_or_else(|| path.to_path_buf());
    save_cvs(&output, &normalized)?;

    for line in describe(&normalized) {
        println!("{}", line);
    }
    println!("✓ Normalized definitions written to: {}", output.display());
    Ok(())
}
