//! Builder and Runner registration types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BuildConfig, CoreError, ServiceKey};

/// Which side of the pipeline a service sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Builder,
    Runner,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builder => f.write_str("Builder"),
            Self::Runner => f.write_str("Runner"),
        }
    }
}

impl FromStr for ServiceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Builder" => Ok(Self::Builder),
            "Runner" => Ok(Self::Runner),
            other => Err(CoreError::UnknownServiceKind(other.to_string())),
        }
    }
}

/// A registered Builder or Runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub key: ServiceKey,
    pub kind: ServiceKind,
    pub goos: String,
    pub goarch: String,
    /// Base URL the service accepts calls on.
    pub url: String,
}

impl ServiceInfo {
    /// Check if binaries built for `config` can run on this service.
    pub fn runs(&self, config: &BuildConfig) -> bool {
        self.goos == config.goos && self.goarch == config.goarch
    }

    pub fn config(&self) -> BuildConfig {
        BuildConfig::new(&self.goos, &self.goarch)
    }
}
