//! Cross-compilation target triples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// C library family of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibcFamily {
    Gnu,
    Musl,
    Other,
}

/// A target triple naming an (architecture, libc variant) pair.
///
/// Stored and serialized as the triple string, e.g.
/// `arm-unknown-linux-musleabi`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetSpec {
    triple: String,
}

impl TargetSpec {
    /// Parse a target triple.
    pub fn parse(triple: &str) -> Result<Self, CoreError> {
        let triple = triple.trim();
        let parts: Vec<&str> = triple.split('-').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::InvalidTarget(triple.to_string()));
        }
        Ok(Self {
            triple: triple.to_string(),
        })
    }

    /// Full triple string.
    pub fn as_str(&self) -> &str {
        &self.triple
    }

    /// CPU architecture (first triple component).
    pub fn arch(&self) -> &str {
        self.component(0).unwrap_or_default()
    }

    /// Operating system component.
    pub fn os(&self) -> &str {
        self.component(2).unwrap_or_default()
    }

    /// C library / ABI variant, e.g. `gnu`, `musl`, `musleabi`.
    ///
    /// Empty for three-component triples.
    pub fn libc(&self) -> &str {
        self.component(3).unwrap_or_default()
    }

    pub fn libc_family(&self) -> LibcFamily {
        let libc = self.libc();
        if libc.starts_with("musl") {
            LibcFamily::Musl
        } else if libc.starts_with("gnu") {
            LibcFamily::Gnu
        } else {
            LibcFamily::Other
        }
    }

    /// Short `arch-libc` label used in job names, e.g. `aarch64-musl`.
    pub fn short_name(&self) -> String {
        match self.libc() {
            "" => self.arch().to_string(),
            libc => format!("{}-{}", self.arch(), libc),
        }
    }

    fn component(&self, idx: usize) -> Option<&str> {
        self.triple.split('-').nth(idx)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.triple)
    }
}

impl FromStr for TargetSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetSpec {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TargetSpec> for String {
    fn from(t: TargetSpec) -> Self {
        t.triple
    }
}
