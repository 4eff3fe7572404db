use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "statesampler - adaptive swarm sampling of molecular dynamics walkers \
             guided by collective variables.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run swarm iterations, or evaluate finished ones in convergence mode.
    Run(RunArgs),
    /// Inspect and normalize collective variable definition files.
    Cvs(CvsArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Iteration to start from.
    #[arg(long, required = true, value_name = "INT")]
    pub iteration: usize,

    /// Root directory holding one subdirectory per iteration.
    #[arg(short, long, value_name = "PATH")]
    pub working_dir: Option<PathBuf>,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Collective variable definitions (JSON). Defaults to 'cvs.json'.
    #[arg(long, value_name = "PATH")]
    pub cvs: Option<PathBuf>,

    /// Identifier used in output file names. Defaults to 'ss'.
    #[arg(long, value_name = "ID")]
    pub simu_id: Option<String>,

    /// Starting structure, relative to the working directory.
    #[arg(long, value_name = "FILE")]
    pub starting_structure: Option<String>,

    // --- Sampling Overrides ---
    /// Number of walkers per iteration.
    #[arg(short = 'n', long, value_name = "INT")]
    pub swarm_size: Option<usize>,

    /// 'single_state' favors walkers near the swarm center, 'multi_state' dispersed ones.
    #[arg(short = 'e', long, value_name = "TYPE")]
    pub exploration_type: Option<String>,

    /// 'server' runs iterations, 'convergence' only evaluates finished ones.
    #[arg(short = 'm', long, value_name = "MODE")]
    pub start_mode: Option<String>,

    /// Last iteration to run, inclusive.
    #[arg(long, value_name = "INT")]
    pub max_iteration: Option<usize>,

    // --- Execution Overrides ---
    /// Seconds between completion checks.
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    /// Give up waiting for walkers after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Submission script handed to the scheduler, relative to the iteration directory.
    #[arg(long, value_name = "PATH")]
    pub submit_script: Option<String>,

    /// File name template of walker trajectories; '{i}' is the walker index.
    #[arg(long, value_name = "TEMPLATE")]
    pub trajectory_pattern: Option<String>,

    /// Set a specific configuration value, overriding the config file and flags.
    /// Can be used multiple times. Example: -S sampling.swarm-size=12
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `cvs` subcommand.
#[derive(Args, Debug)]
pub struct CvsArgs {
    #[command(subcommand)]
    pub command: CvsCommands,
}

#[derive(Subcommand, Debug)]
pub enum CvsCommands {
    /// List the collective variables of a definition file.
    Show {
        /// The CV definition file.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Fit each CV's normalization to a set of trajectories and save the result.
    Normalize {
        /// The CV definition file.
        #[arg(required = true)]
        path: PathBuf,
        /// Directory holding the trajectories.
        #[arg(short, long, required = true, value_name = "DIR")]
        directory: PathBuf,
        /// Wildcard pattern of the trajectory files.
        #[arg(short, long, required = true, value_name = "PATTERN")]
        trajectory: String,
        /// Wildcard pattern of the topology file.
        #[arg(long, required = true, value_name = "PATTERN")]
        topology: String,
        /// Keep every n-th frame.
        #[arg(long, default_value_t = 1, value_name = "INT")]
        stride: usize,
        /// Atom selection applied before evaluation.
        #[arg(long, default_value = "protein", value_name = "QUERY")]
        query: String,
        /// Output file. Defaults to overwriting the input.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}
