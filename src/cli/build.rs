//! Build command.

use std::path::PathBuf;

use clap::Args;
use mcharm::{BuildMode, BuildReport, Builder, Result};
use tracing::info;

use super::{format_size, ConfigArgs};

/// Build a script into an executable.
///
/// Examples:
///   mcharm build app.py -o app
///   mcharm build app.py -o app --mode wrapped
///   mcharm build app.py -o app-arm --target linux-aarch64 --yes
///   mcharm build --targets
#[derive(Args, Debug)]
pub struct BuildCmd {
    /// Script to package
    #[arg(value_name = "SCRIPT", required_unless_present = "targets")]
    pub script: Option<PathBuf>,

    /// Output file path
    #[arg(short = 'o', long, value_name = "PATH", required_unless_present = "targets")]
    pub output: Option<PathBuf>,

    /// Output kind: minimal, wrapped or container
    #[arg(long, default_value_t = BuildMode::Container, value_name = "MODE")]
    pub mode: BuildMode,

    /// Target to build for (default: host)
    #[arg(long, value_name = "TARGET")]
    pub target: Option<String>,

    /// List recognized targets and exit
    #[arg(long)]
    pub targets: bool,

    /// Print the build report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl BuildCmd {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;

        if self.targets {
            return super::targets::print_targets(&Builder::new(config), self.json);
        }

        let (Some(script), Some(output)) = (self.script, self.output) else {
            // clap enforces both unless --targets.
            return Ok(());
        };

        info!(script = %script.display(), output = %output.display(), mode = %self.mode, "building");
        let builder = Builder::new(config);
        let report = builder.build(&script, &output, self.mode, self.target.as_deref())?;

        if self.json {
            print_json(&report);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_json(report: &BuildReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!(error = %e, "report serialization failed"),
    }
}

fn print_report(report: &BuildReport) {
    match &report.target {
        Some(target) => println!(
            "Built {} ({}, {})",
            report.output.display(),
            report.mode,
            target
        ),
        None => println!("Built {} ({})", report.output.display(), report.mode),
    }
    if let (Some(stub), Some(image)) = (report.stub_size, report.image_size) {
        println!("  stub:    {}", format_size(stub));
        println!("  runtime: {}", format_size(image));
    }
    println!("  payload: {}", format_size(report.payload_size));
    println!("  total:   {}", format_size(report.total_size));
}
