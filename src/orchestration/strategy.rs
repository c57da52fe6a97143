//! Processing strategies: checkpoint cadence and retry aggressiveness as data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named strategy selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Standard,
    HighThroughput,
    ReliabilityFocused,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::HighThroughput => write!(f, "high_throughput"),
            Self::ReliabilityFocused => write!(f, "reliability_focused"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "high_throughput" => Ok(Self::HighThroughput),
            "reliability_focused" => Ok(Self::ReliabilityFocused),
            _ => Err(format!("Invalid processing strategy: {s}")),
        }
    }
}

/// Tunables the engine loop consults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStrategy {
    pub kind: StrategyKind,
    /// Save a checkpoint after this many attempted items
    pub checkpoint_interval: u64,
    /// Transform calls per item, first attempt included
    pub max_attempts: u32,
    /// Give malformed output another attempt instead of failing the item
    pub retry_malformed: bool,
}

impl ProcessingStrategy {
    pub fn for_kind(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Standard => Self {
                kind,
                checkpoint_interval: 10,
                max_attempts: 3,
                retry_malformed: false,
            },
            StrategyKind::HighThroughput => Self {
                kind,
                checkpoint_interval: 25,
                max_attempts: 2,
                retry_malformed: false,
            },
            StrategyKind::ReliabilityFocused => Self {
                kind,
                checkpoint_interval: 1,
                max_attempts: 5,
                retry_malformed: true,
            },
        }
    }

    pub fn standard() -> Self {
        Self::for_kind(StrategyKind::Standard)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Whether a checkpoint is due after `attempted` items in this run
    pub fn checkpoint_due(&self, attempted: u64) -> bool {
        attempted > 0 && attempted % self.checkpoint_interval.max(1) == 0
    }
}

impl Default for ProcessingStrategy {
    fn default() -> Self {
        Self::standard()
    }
}
