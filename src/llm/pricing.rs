//! Token pricing for LLM cost accounting.
//!
//! Rates are expressed in dollars per million tokens. Models without an
//! explicit rate use the table's default rate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Usage;

/// Tokens per pricing unit.
const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Dollar cost per million input and output tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl TokenRate {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost in dollars of `input_tokens` prompt and `output_tokens` completion tokens.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / TOKENS_PER_MILLION) * self.input_per_million
            + (output_tokens as f64 / TOKENS_PER_MILLION) * self.output_per_million
    }
}

impl Default for TokenRate {
    fn default() -> Self {
        Self::new(2.50, 10.00)
    }
}

/// Model id to [`TokenRate`] lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    default_rate: TokenRate,
    #[serde(default)]
    rates: HashMap<String, TokenRate>,
}

impl PricingTable {
    /// A table where every model is billed at `default_rate`.
    pub fn new(default_rate: TokenRate) -> Self {
        Self {
            default_rate,
            rates: HashMap::new(),
        }
    }

    /// Builder method to price `model` explicitly.
    pub fn with_rate(mut self, model: impl Into<String>, rate: TokenRate) -> Self {
        self.rates.insert(model.into(), rate);
        self
    }

    /// Rate applied to `model`.
    pub fn rate_for(&self, model: &str) -> TokenRate {
        self.rates.get(model).copied().unwrap_or(self.default_rate)
    }

    /// Cost in dollars of one response's usage.
    pub fn cost(&self, model: &str, usage: &Usage) -> f64 {
        self.rate_for(model)
            .cost(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> Usage {
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_default_rate() {
        let table = PricingTable::default();
        let cost = table.cost("gpt-4", &usage(1_000_000, 1_000_000));
        assert!((cost - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_small_usage() {
        let table = PricingTable::default();
        // 1000 * 2.5e-6 + 500 * 1e-5
        let cost = table.cost("any", &usage(1000, 500));
        assert!((cost - 0.0075).abs() < 1e-12);
    }

    #[test]
    fn test_model_override() {
        let table = PricingTable::default().with_rate("cheap", TokenRate::new(0.1, 0.2));
        assert_eq!(table.rate_for("cheap"), TokenRate::new(0.1, 0.2));
        assert_eq!(table.rate_for("other"), TokenRate::default());
        assert_eq!(table.cost("cheap", &usage(0, 0)), 0.0);
    }
}
