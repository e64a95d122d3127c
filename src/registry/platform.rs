//! Target platforms
//!
//! Artifacts are installed into Linux container images, so a platform is just
//! the CPU architecture. Each upstream spells it differently; the spellings
//! live here rather than at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amd64,
    Arm64,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Amd64, Platform::Arm64];

    /// Docker/Go spelling, also the pinned database key
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amd64 => "amd64",
            Platform::Arm64 => "arm64",
        }
    }

    /// Node.js spelling (`x64`)
    pub fn node_arch(&self) -> &'static str {
        match self {
            Platform::Amd64 => "x64",
            Platform::Arm64 => "arm64",
        }
    }

    /// GNU spelling (`x86_64`), as used in target triples
    pub fn gnu_arch(&self) -> &'static str {
        match self {
            Platform::Amd64 => "x86_64",
            Platform::Arm64 => "aarch64",
        }
    }

    /// Platform of the running process, if supported.
    pub fn host() -> Option<Self> {
        std::env::consts::ARCH.parse().ok()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arch = s.trim().to_ascii_lowercase();
        let arch = arch.strip_prefix("linux/").unwrap_or(&arch);
        match arch {
            "amd64" | "x86_64" | "x64" => Ok(Platform::Amd64),
            "arm64" | "aarch64" => Ok(Platform::Arm64),
            other => Err(format!("unsupported platform '{}' (expected amd64 or arm64)", other)),
        }
    }
}
