//! Model pricing and request cost estimation.
//!
//! Prices are in USD per 1M tokens (input/output). The Qwen3-VL-Flash family
//! is priced by input-token bracket; the other known models carry flat rates.
//! Unknown models fall back to the default model's pricing so the estimate is
//! always defined.

use serde::Serialize;

// MARK: - Types

/// Cost breakdown for one request, in USD.
#[derive(Debug, Clone, Serialize)]
pub struct CostBreakdown {
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
    /// Identifier of the pricing entry that was applied.
    pub pricing_model: String,
}

/// Per-1M-token rates selected for a request.
#[derive(Debug, Clone, Copy)]
struct Rates {
    input_per_million: f64,
    output_per_million: f64,
}

// MARK: - Static tables

/// Input-token brackets for Qwen3-VL-Flash (inclusive upper bounds).
const FLASH_TIERS: &[(u64, Rates)] = &[
    (
        32_000,
        Rates {
            input_per_million: 0.05,
            output_per_million: 0.40,
        },
    ),
    (
        128_000,
        Rates {
            input_per_million: 0.075,
            output_per_million: 0.60,
        },
    ),
];

/// Rates above the last bracket.
const FLASH_TOP: Rates = Rates {
    input_per_million: 0.12,
    output_per_million: 0.96,
};

/// Flat per-1M rates for the other known models. Matched by substring of the
/// lowercased model id, first match wins.
const FLAT_PRICING: &[(&str, Rates)] = &[
    (
        "qwen-vl-max",
        Rates {
            input_per_million: 2.8,
            output_per_million: 8.4,
        },
    ),
    (
        "qwen-vl-plus",
        Rates {
            input_per_million: 1.12,
            output_per_million: 2.8,
        },
    ),
    (
        "qwen3-vl-plus",
        Rates {
            input_per_million: 1.12,
            output_per_million: 2.8,
        },
    ),
    (
        "qwen-vl-turbo",
        Rates {
            input_per_million: 0.28,
            output_per_million: 0.84,
        },
    ),
];

/// Pricing applied when the model matches nothing in the tables.
const FALLBACK_MODEL: &str = "qwen-vl-plus";
const FALLBACK_RATES: Rates = Rates {
    input_per_million: 1.12,
    output_per_million: 2.8,
};

// MARK: - Pricing table

/// Static pricing table. Read-only and process-wide; construct once and pass
/// it to whoever estimates costs.
#[derive(Debug, Clone, Default)]
pub struct PricingTable;

impl PricingTable {
    pub fn new() -> Self {
        Self
    }

    /// Estimate the cost of a request from its token counts.
    ///
    /// Pure function: no side effects, and the only "failure mode" is the
    /// documented fallback to the default model's pricing.
    pub fn estimate(&self, model: &str, input_tokens: u64, output_tokens: u64) -> CostBreakdown {
        let model_lower = model.to_lowercase();

        let (rates, pricing_model) = if model_lower.contains("qwen3-vl-flash") {
            (
                flash_rates(input_tokens),
                "qwen3-vl-flash-tiered".to_string(),
            )
        } else {
            let (key, rates) = FLAT_PRICING
                .iter()
                .find(|(key, _)| model_lower.contains(*key))
                .copied()
                .unwrap_or((FALLBACK_MODEL, FALLBACK_RATES));
            (rates, key.to_string())
        };

        let input_cost = input_tokens as f64 / 1_000_000.0 * rates.input_per_million;
        let output_cost = output_tokens as f64 / 1_000_000.0 * rates.output_per_million;

        CostBreakdown {
            input_cost_usd: round6(input_cost),
            output_cost_usd: round6(output_cost),
            total_cost_usd: round6(input_cost + output_cost),
            pricing_model,
        }
    }
}

/// Select the Qwen3-VL-Flash bracket by input-token count.
fn flash_rates(input_tokens: u64) -> Rates {
    for &(upper_bound, rates) in FLASH_TIERS {
        if input_tokens <= upper_bound {
            return rates;
        }
    }
    FLASH_TOP
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// MARK: - Tests
