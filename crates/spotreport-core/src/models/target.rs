use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Minimum number of `#`-separated components in a target identifier.
pub const MIN_TARGET_COMPONENTS: usize = 3;

/// The spot a report is about, identified as `country#region#spot`.
///
/// Anything after the second separator belongs to the spot name, so
/// `"France#Landes#Hossegor#La Graviere"` parses with spot
/// `"Hossegor#La Graviere"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpotTarget {
    pub country: String,
    pub region: String,
    pub spot: String,
}

impl SpotTarget {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let parts: Vec<&str> = raw.split('#').map(str::trim).collect();

        if parts.len() < MIN_TARGET_COMPONENTS {
            return Err(PipelineError::MalformedTarget(format!(
                "'{}' has {} component(s), expected country#region#spot",
                raw,
                parts.len()
            )));
        }

        if parts.iter().any(|p| p.is_empty()) {
            return Err(PipelineError::MalformedTarget(format!(
                "'{}' contains an empty component",
                raw
            )));
        }

        Ok(Self {
            country: parts[0].to_string(),
            region: parts[1].to_string(),
            spot: parts[2..].join("#"),
        })
    }

    /// Identifier in its wire form.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl FromStr for SpotTarget {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SpotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.country, self.region, self.spot)
    }
}
