//! # Cost Tracking
//!
//! Pluggable accounting of generation spend. Small batches keep a per-item
//! breakdown; large batches keep running totals only. The engine consults the
//! report after every call and pauses the run when a configured budget is spent.

use crate::client::TokenUsage;
use crate::config::CostConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    Minimal,
    Full,
    /// Full below the configured batch-size threshold, minimal at or above it
    #[default]
    Auto,
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Full => write!(f, "full"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Spend attributed to one work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCost {
    pub work_item_index: u64,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub calls: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
    /// Present only under full tracking
    pub items: Option<Vec<ItemCost>>,
}

impl CostReport {
    pub fn budget_exhausted(&self, limit: Option<f64>) -> bool {
        self.budget_exhausted_after(0.0, limit)
    }

    /// Budget check including `prior` spend carried over from earlier runs
    pub fn budget_exhausted_after(&self, prior: f64, limit: Option<f64>) -> bool {
        limit.is_some_and(|limit| prior + self.estimated_cost >= limit)
    }
}

pub trait CostEstimator: Send + Sync + fmt::Debug {
    /// Account for one transform call
    fn record(&self, work_item_index: u64, usage: Option<TokenUsage>);

    fn report(&self) -> CostReport;

    fn name(&self) -> &'static str;
}

fn cost_of(tokens: u64, price_per_1k_tokens: f64) -> f64 {
    tokens as f64 / 1000.0 * price_per_1k_tokens
}

/// Running totals only
#[derive(Debug)]
pub struct MinimalCostTracking {
    price_per_1k_tokens: f64,
    totals: Mutex<(u64, u64)>,
}

impl MinimalCostTracking {
    pub fn new(price_per_1k_tokens: f64) -> Self {
        Self {
            price_per_1k_tokens,
            totals: Mutex::new((0, 0)),
        }
    }
}

impl CostEstimator for MinimalCostTracking {
    fn record(&self, _work_item_index: u64, usage: Option<TokenUsage>) {
        let mut totals = self.totals.lock();
        totals.0 += 1;
        totals.1 += usage.map(|u| u.total()).unwrap_or(0);
    }

    fn report(&self) -> CostReport {
        let (calls, total_tokens) = *self.totals.lock();
        CostReport {
            calls,
            total_tokens,
            estimated_cost: cost_of(total_tokens, self.price_per_1k_tokens),
            items: None,
        }
    }

    fn name(&self) -> &'static str {
        "minimal"
    }
}

/// Per-item breakdown in addition to totals
#[derive(Debug)]
pub struct FullCostTracking {
    price_per_1k_tokens: f64,
    items: Mutex<Vec<ItemCost>>,
}

impl FullCostTracking {
    pub fn new(price_per_1k_tokens: f64) -> Self {
        Self {
            price_per_1k_tokens,
            items: Mutex::new(Vec::new()),
        }
    }
}

impl CostEstimator for FullCostTracking {
    fn record(&self, work_item_index: u64, usage: Option<TokenUsage>) {
        let tokens = usage.map(|u| u.total()).unwrap_or(0);
        self.items.lock().push(ItemCost {
            work_item_index,
            tokens,
            cost: cost_of(tokens, self.price_per_1k_tokens),
        });
    }

    fn report(&self) -> CostReport {
        let items = self.items.lock().clone();
        let total_tokens = items.iter().map(|i| i.tokens).sum();
        CostReport {
            calls: items.len() as u64,
            total_tokens,
            estimated_cost: cost_of(total_tokens, self.price_per_1k_tokens),
            items: Some(items),
        }
    }

    fn name(&self) -> &'static str {
        "full"
    }
}

/// Picks a cost estimator for a run
pub struct CostPolicy;

impl CostPolicy {
    /// `expected_items` is the source's size hint; an unknown size counts as large
    pub fn select(config: &CostConfig, expected_items: Option<u64>) -> Arc<dyn CostEstimator> {
        let full = match config.mode {
            CostMode::Full => true,
            CostMode::Minimal => false,
            CostMode::Auto => expected_items.is_some_and(|n| n < config.threshold),
        };
        if full {
            Arc::new(FullCostTracking::new(config.price_per_1k_tokens))
        } else {
            Arc::new(MinimalCostTracking::new(config.price_per_1k_tokens))
        }
    }
}
