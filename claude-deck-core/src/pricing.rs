//! Per-model token pricing and cost estimation
//!
//! Prices are USD per million tokens. Lookup resolves a model id in three
//! steps, and never fails:
//!
//! 1. exact id
//! 2. id with a trailing `-YYYYMMDD` date suffix removed
//! 3. the default model (`claude-sonnet-4-6` unless configured otherwise)
//!
//! Cache writes are priced per lifetime tier when the usage record splits
//! them; otherwise every cache-creation token is billed at the 5-minute rate.

use crate::config::PricingConfig;
use crate::types::Usage;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Model used when an id matches nothing in the table.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

static DATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d{8,}$").expect("valid date suffix regex"));

static BUILTIN: LazyLock<PricingTable> = LazyLock::new(PricingTable::builtin);

/// Price points for one model, USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write_5m: f64,
    pub cache_write_1h: f64,
}

impl ModelPricing {
    pub const fn new(
        input: f64,
        output: f64,
        cache_read: f64,
        cache_write_5m: f64,
        cache_write_1h: f64,
    ) -> Self {
        Self {
            input,
            output,
            cache_read,
            cache_write_5m,
            cache_write_1h,
        }
    }

    /// Cost of one usage record at these prices.
    pub fn cost(&self, usage: &Usage) -> f64 {
        let (tier_5m, tier_1h) = usage
            .cache_creation
            .as_ref()
            .map(|c| (c.ephemeral_5m_input_tokens, c.ephemeral_1h_input_tokens))
            .unwrap_or((0, 0));

        let cache_write = if tier_5m + tier_1h > 0 {
            tier_5m as f64 * self.cache_write_5m + tier_1h as f64 * self.cache_write_1h
        } else {
            usage.cache_creation_input_tokens as f64 * self.cache_write_5m
        };

        (usage.input_tokens as f64 * self.input
            + usage.output_tokens as f64 * self.output
            + usage.cache_read_input_tokens as f64 * self.cache_read
            + cache_write)
            / 1_000_000.0
    }
}

static BUILTIN_PRICES: &[(&str, ModelPricing)] = &[
    // Current models
    ("claude-opus-4-6", ModelPricing::new(5.0, 25.0, 0.5, 6.25, 10.0)),
    ("claude-opus-4-5", ModelPricing::new(5.0, 25.0, 0.5, 6.25, 10.0)),
    ("claude-sonnet-4-6", ModelPricing::new(3.0, 15.0, 0.3, 3.75, 6.0)),
    ("claude-sonnet-4-5", ModelPricing::new(3.0, 15.0, 0.3, 3.75, 6.0)),
    ("claude-sonnet-4", ModelPricing::new(3.0, 15.0, 0.3, 3.75, 6.0)),
    ("claude-haiku-4-5", ModelPricing::new(1.0, 5.0, 0.1, 1.25, 2.0)),
    // Older models
    ("claude-opus-4-1", ModelPricing::new(15.0, 75.0, 1.5, 18.75, 30.0)),
    ("claude-opus-4", ModelPricing::new(15.0, 75.0, 1.5, 18.75, 30.0)),
    ("claude-sonnet-4-5-20250514", ModelPricing::new(3.0, 15.0, 0.3, 3.75, 6.0)),
    ("claude-3-5-sonnet-20241022", ModelPricing::new(3.0, 15.0, 0.3, 3.75, 6.0)),
    ("claude-3-5-haiku-20241022", ModelPricing::new(0.8, 4.0, 0.08, 1.0, 1.6)),
    ("claude-haiku-3", ModelPricing::new(0.25, 1.25, 0.03, 0.3, 0.5)),
];

/// Model id → price table with a fallback model.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
    default_model: String,
}

impl PricingTable {
    /// The built-in price list.
    pub fn builtin() -> Self {
        Self {
            prices: BUILTIN_PRICES
                .iter()
                .map(|(id, p)| (id.to_string(), *p))
                .collect(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Built-in prices extended by `[pricing.models]` entries from config.
    ///
    /// A configured default model that has no price falls back to
    /// [`DEFAULT_MODEL`].
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::builtin();
        table
            .prices
            .extend(config.models.iter().map(|(id, p)| (id.clone(), *p)));
        if table.prices.contains_key(&config.default_model) {
            table.default_model = config.default_model.clone();
        } else {
            tracing::warn!(
                model = %config.default_model,
                "Configured default pricing model is unknown, keeping built-in default"
            );
        }
        table
    }

    /// Resolve the price point for `model`, falling back as described in the module docs.
    pub fn lookup(&self, model: &str) -> &ModelPricing {
        if let Some(p) = self.prices.get(model) {
            return p;
        }
        if let Some(p) = self.prices.get(strip_date_suffix(model)) {
            return p;
        }
        tracing::debug!(model, fallback = %self.default_model, "No price for model");
        self.prices
            .get(&self.default_model)
            .unwrap_or(&BUILTIN_PRICES[2].1)
    }

    /// Estimated USD cost of `usage` billed as `model`.
    pub fn estimate(&self, model: &str, usage: &Usage) -> f64 {
        self.lookup(model).cost(usage)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Estimate cost against the built-in table.
pub fn estimate_cost(model: &str, usage: &Usage) -> f64 {
    BUILTIN.estimate(model, usage)
}

/// Remove a trailing `-YYYYMMDD` (or longer digit run) from a model id.
pub fn strip_date_suffix(model: &str) -> &str {
    match DATE_SUFFIX.find(model) {
        Some(m) => &model[..m.start()],
        None => model,
    }
}

/// Family name for display: `opus`, `sonnet`, `haiku`, or the id itself.
pub fn short_model_name(model: &str) -> &str {
    ["opus", "sonnet", "haiku"]
        .into_iter()
        .find(|family| model.contains(family))
        .unwrap_or(model)
}
