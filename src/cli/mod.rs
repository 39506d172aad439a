//! CLI command implementations.

pub mod build;
pub mod inspect;
pub mod run;
pub mod targets;

use std::path::PathBuf;

use clap::Args;
use mcharm::{PackConfig, Result};

/// Options shared by commands that touch the runtime cache.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Cache directory (default: $MCHARM_HOME or ~/.mcharm)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Download missing runtimes without asking
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl ConfigArgs {
    /// Load the configuration with command-line overrides applied.
    pub fn load(&self) -> Result<PackConfig> {
        let mut config = match &self.cache_dir {
            Some(dir) => {
                let mut config = PackConfig::load_from(dir)?;
                if let Some(source) = std::env::var_os(mcharm::config::SOURCE_DIR_ENV) {
                    config.source_dir = Some(PathBuf::from(source));
                }
                config
            }
            None => PackConfig::load()?,
        };
        if self.yes {
            config.interactive = false;
        }
        Ok(config)
    }
}

/// Format a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;

    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}
