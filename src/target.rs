//! Build targets.
//!
//! The set of targets is closed: every container is built for one of
//! [`BuildTarget::ALL`], and each target maps to exactly one stub and one
//! interpreter image.
//!
//! | Target | Stub | Image |
//! |--------|------|-------|
//! | `linux-x86_64` | `mcharm-stub-linux-x86_64` | `mcharm-runtime-linux-x86_64` |
//! | `linux-aarch64` | `mcharm-stub-linux-aarch64` | `mcharm-runtime-linux-aarch64` |
//! | `macos-x86_64` | `mcharm-stub-macos-x86_64` | `mcharm-runtime-macos-x86_64` |
//! | `macos-aarch64` | `mcharm-stub-macos-aarch64` | `mcharm-runtime-macos-aarch64` |

use std::fmt;
use std::str::FromStr;

use crate::error::BuildError;

/// Target operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Linux
    Linux,
    /// macOS (Darwin)
    MacOs,
}

impl Os {
    /// The OS this binary was compiled for, if it is a supported target.
    pub const fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Os::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Os::MacOs)
        } else {
            None
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => write!(f, "linux"),
            Os::MacOs => write!(f, "macos"),
        }
    }
}

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// x86 64-bit (amd64)
    X86_64,
    /// ARM 64-bit
    Aarch64,
}

impl Arch {
    /// The architecture this binary was compiled for, if supported.
    pub const fn current() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Arch::X86_64)
        } else if cfg!(target_arch = "aarch64") {
            Some(Arch::Aarch64)
        } else {
            None
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86_64 => write!(f, "x86_64"),
            Arch::Aarch64 => write!(f, "aarch64"),
        }
    }
}

/// An (OS, architecture) pair a container can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildTarget {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
}

impl BuildTarget {
    /// Every recognized target.
    pub const ALL: [BuildTarget; 4] = [
        BuildTarget::new(Os::Linux, Arch::X86_64),
        BuildTarget::new(Os::Linux, Arch::Aarch64),
        BuildTarget::new(Os::MacOs, Arch::X86_64),
        BuildTarget::new(Os::MacOs, Arch::Aarch64),
    ];

    /// Create a target.
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The target this binary runs on.
    pub fn host() -> Result<Self, BuildError> {
        match (Os::current(), Arch::current()) {
            (Some(os), Some(arch)) => Ok(Self::new(os, arch)),
            _ => Err(BuildError::UnsupportedTarget {
                target: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            }),
        }
    }

    /// Whether this is the host target.
    pub fn is_host(&self) -> bool {
        Os::current() == Some(self.os) && Arch::current() == Some(self.arch)
    }

    /// Canonical name, e.g. `linux-x86_64`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    /// File name of the stub binary for this target.
    pub fn stub_id(&self) -> String {
        format!("mcharm-stub-{}", self.name())
    }

    /// File name of the interpreter image for this target.
    pub fn image_id(&self) -> String {
        format!("mcharm-runtime-{}", self.name())
    }

    /// Target triple passed to `zig build -Dtarget=`.
    pub const fn zig_triple(&self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Linux, Arch::X86_64) => "x86_64-linux-musl",
            (Os::Linux, Arch::Aarch64) => "aarch64-linux-musl",
            (Os::MacOs, Arch::X86_64) => "x86_64-macos",
            (Os::MacOs, Arch::Aarch64) => "aarch64-macos",
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for BuildTarget {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let (os, arch) = normalized
            .split_once(['-', '/'])
            .ok_or_else(|| unsupported(s))?;

        let os = match os {
            "linux" => Os::Linux,
            "macos" | "darwin" => Os::MacOs,
            _ => return Err(unsupported(s)),
        };
        let arch = match arch {
            "x86_64" | "amd64" => Arch::X86_64,
            "aarch64" | "arm64" => Arch::Aarch64,
            _ => return Err(unsupported(s)),
        };

        Ok(Self::new(os, arch))
    }
}

fn unsupported(s: &str) -> BuildError {
    BuildError::UnsupportedTarget {
        target: s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for target in BuildTarget::ALL {
            let parsed: BuildTarget = target.name().parse().unwrap();
            assert_eq!(parsed, target);
            assert_eq!(target.to_string(), target.name());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            "darwin/arm64".parse::<BuildTarget>().unwrap(),
            BuildTarget::new(Os::MacOs, Arch::Aarch64)
        );
        assert_eq!(
            "Linux-AMD64".parse::<BuildTarget>().unwrap(),
            BuildTarget::new(Os::Linux, Arch::X86_64)
        );
    }

    #[test]
    fn test_unknown_target_rejected() {
        for bad in ["", "linux", "windows-x86_64", "linux-riscv64", "plan9"] {
            let err = bad.parse::<BuildTarget>().unwrap_err();
            assert!(matches!(err, BuildError::UnsupportedTarget { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_identifiers_are_distinct() {
        let mut ids: Vec<String> = BuildTarget::ALL
            .iter()
            .flat_map(|t| [t.stub_id(), t.image_id()])
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), BuildTarget::ALL.len() * 2);
    }

    #[test]
    fn test_stub_and_image_ids() {
        let target = BuildTarget::new(Os::Linux, Arch::X86_64);
        assert_eq!(target.stub_id(), "mcharm-stub-linux-x86_64");
        assert_eq!(target.image_id(), "mcharm-runtime-linux-x86_64");
        assert_eq!(target.zig_triple(), "x86_64-linux-musl");
    }

    #[test]
    #[cfg(any(
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "aarch64"),
        all(target_os = "macos", target_arch = "x86_64"),
        all(target_os = "macos", target_arch = "aarch64"),
    ))]
    fn test_host_is_known() {
        let host = BuildTarget::host().unwrap();
        assert!(host.is_host());
        assert!(BuildTarget::ALL.contains(&host));
        assert_eq!(BuildTarget::ALL.iter().filter(|t| t.is_host()).count(), 1);
    }
}
