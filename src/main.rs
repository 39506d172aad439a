//! mcharm CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// mcharm - package scripts into self-contained executables
#[derive(Parser, Debug)]
#[command(name = "mcharm")]
#[command(about = "Package scripts into self-contained native executables")]
#[command(
    long_about = "mcharm packages a script together with an interpreter into a single \
native executable that runs without anything installed.\n\n\
Quick start:\n  \
mcharm build hello.py -o hello\n  \
mcharm build hello.py -o hello-arm --target linux-aarch64\n  \
mcharm run hello.py -- --name world"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a script into an executable
    Build(cli::build::BuildCmd),

    /// Run a script directly with the host interpreter image
    Run(cli::run::RunCmd),

    /// Show the layout of a built container
    Inspect(cli::inspect::InspectCmd),

    /// List build targets and their offline availability
    Targets(cli::targets::TargetsCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging();

    tracing::debug!(version = mcharm::VERSION, "starting mcharm");

    let result = match cli.command {
        Commands::Build(cmd) => cmd.run(),
        Commands::Run(cmd) => cmd.run(),
        Commands::Inspect(cmd) => cmd.run(),
        Commands::Targets(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("mcharm: error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcharm=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
