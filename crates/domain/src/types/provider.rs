//! Supported accounting providers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// External accounting service a tenant can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Xero,
    QuickBooks,
}

impl Provider {
    /// Stable identifier used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xero => "xero",
            Self::QuickBooks => "quickbooks",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xero" => Ok(Self::Xero),
            "quickbooks" | "qbo" => Ok(Self::QuickBooks),
            other => Err(SyncError::Config(format!("unknown provider: {other}"))),
        }
    }
}
