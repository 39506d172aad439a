//! Run command.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Args;
use mcharm::{Passthrough, Result, RuntimeCache};

use super::ConfigArgs;

/// Run a script with the host interpreter image, without building.
///
/// The exit code is the script's own, or 128+N if it died by signal N.
///
/// Examples:
///   mcharm run app.py
///   mcharm run app.py -- --verbose input.txt
#[derive(Args, Debug)]
pub struct RunCmd {
    /// Script to run
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<OsString>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl RunCmd {
    pub fn run(self) -> Result<()> {
        let runtime = RuntimeCache::new(self.config.load()?);
        let code = mcharm::run::run_script(&runtime, &Passthrough, &self.script, &self.args)?;
        std::process::exit(code);
    }
}
