//! Deployment environment
//!
//! Identifies which cloud deployment this process runs in. The value is
//! resolved once from configuration and passed into the workflow and relay;
//! nothing downstream inspects the process environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Aws,
    Gcp,
    Local,
}

impl Environment {
    /// Tag stamped into the `source` field of every published envelope.
    pub fn source_tag(&self) -> &'static str {
        match self {
            Environment::Aws => "AWS-Fargate",
            Environment::Gcp => "GCP-CloudRun",
            Environment::Local => "Local",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Aws => "aws",
            Environment::Gcp => "gcp",
            Environment::Local => "local",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an environment name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown environment: {0}")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Environment::Aws),
            "gcp" => Ok(Environment::Gcp),
            "local" | "development" => Ok(Environment::Local),
            other => Err(UnknownEnvironment(other.to_string())),
        }
    }
}
