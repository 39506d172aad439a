//! Packaging tool configuration.
//!
//! Settings come from `<cache_root>/config.json` when present, every field
//! optional:
//!
//! ```json
//! {
//!   "runtime_url": "https://mirror.internal/mcharm/{version}/mcharm-runtime-{target}",
//!   "interpreter": "/opt/micropython/bin/micropython",
//!   "interactive": false
//! }
//! ```
//!
//! The cache root itself is `MCHARM_HOME` or `~/.mcharm`. `MCHARM_SOURCE_DIR`
//! points at a source checkout for local runtime builds.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BuildError, Result};
use crate::target::BuildTarget;

/// Environment variable overriding the cache root.
pub const HOME_ENV: &str = "MCHARM_HOME";
/// Environment variable naming a source checkout.
pub const SOURCE_DIR_ENV: &str = "MCHARM_SOURCE_DIR";
/// Name of the config file inside the cache root.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default download location for interpreter images.
pub const DEFAULT_RUNTIME_URL: &str =
    "https://github.com/mcharm/mcharm/releases/download/v{version}/mcharm-runtime-{target}";
/// Default interpreter for `minimal` and `wrapped` builds.
pub const DEFAULT_INTERPRETER: &str = "micropython";

/// Packaging tool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackConfig {
    /// Root of the runtime cache (`runtimes/`, `stubs/`, `config.json`).
    #[serde(skip)]
    pub cache_root: PathBuf,
    /// Root of the extraction cache used by `mcharm run`.
    pub tmp_root: PathBuf,
    /// Image download URL with `{version}` and `{target}` placeholders.
    pub runtime_url: String,
    /// Interpreter invoked by `minimal` and `wrapped` outputs.
    pub interpreter: String,
    /// Ask before downloading.
    pub interactive: bool,
    /// Source checkout enabling local runtime builds.
    pub source_dir: Option<PathBuf>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            tmp_root: std::env::temp_dir(),
            runtime_url: DEFAULT_RUNTIME_URL.to_string(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            interactive: true,
            source_dir: None,
        }
    }
}

impl PackConfig {
    /// Load configuration using the environment to locate the cache root.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(default_cache_root())?;
        if let Some(dir) = std::env::var_os(SOURCE_DIR_ENV) {
            config.source_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    /// Load configuration rooted at `cache_root`, ignoring the environment.
    ///
    /// A missing config file yields defaults.
    pub fn load_from(cache_root: impl Into<PathBuf>) -> Result<Self> {
        let cache_root = cache_root.into();
        let path = cache_root.join(CONFIG_FILE_NAME);

        let mut config = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<PackConfig>(&text).map_err(|e| {
                BuildError::io(
                    format!("config parse ({})", path.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PackConfig::default(),
            Err(e) => return Err(BuildError::io(format!("config read ({})", path.display()), e)),
        };

        debug!(path = %path.display(), "configuration loaded");
        config.cache_root = cache_root;
        Ok(config)
    }

    /// Directory holding one cached image per target.
    pub fn runtimes_dir(&self) -> PathBuf {
        self.cache_root.join("runtimes")
    }

    /// Directory holding cross-target stubs.
    pub fn stubs_dir(&self) -> PathBuf {
        self.cache_root.join("stubs")
    }

    /// Cached image path for a target.
    pub fn runtime_path(&self, target: &BuildTarget) -> PathBuf {
        self.runtimes_dir().join(target.name())
    }

    /// Download URL for a target's image.
    pub fn runtime_url_for(&self, target: &BuildTarget) -> String {
        self.runtime_url
            .replace("{version}", crate::VERSION)
            .replace("{target}", &target.name())
    }
}

/// `MCHARM_HOME`, else `~/.mcharm`, else `.mcharm` under the temp dir.
pub fn default_cache_root() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".mcharm")
}

/// Whether `dir` looks like a checkout with a buildable runtime.
pub fn is_source_checkout(dir: &Path) -> bool {
    dir.join("runtime").join("build.zig").is_file()
}
