#![forbid(unsafe_code)]

use std::path::Path;

use memory::Order;
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Which n-gram orders a context learns and walks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NgramConfig {
    /// Order 2
    pub digrams: bool,
    /// Order 3
    pub trigrams: bool,
    /// Order 4
    pub quadgrams: bool,
    /// Order 5
    pub quintgrams: bool,
}

impl Default for NgramConfig {
    fn default() -> Self {
        Self { digrams: true, trigrams: true, quadgrams: true, quintgrams: false }
    }
}

impl NgramConfig {
    /// True if `order` is switched on.
    pub fn is_enabled(&self, order: Order) -> bool {
        match order {
            Order::Digram => self.digrams,
            Order::Trigram => self.trigrams,
            Order::Quadgram => self.quadgrams,
            Order::Quintgram => self.quintgrams,
        }
    }

    /// Enabled orders, lowest first.
    pub fn enabled(&self) -> Vec<Order> {
        Order::ALL.into_iter().filter(|o| self.is_enabled(*o)).collect()
    }
}

/// Learning thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Lines with fewer tokens are ignored
    pub min_token_count: usize,
    /// Longest raw token the lexer accepts
    pub max_token_length: usize,
    /// Edges older than this many seconds are ignored and pruned; 0 keeps everything
    pub max_age: i64,
    /// Counters above this trigger a rescale
    pub rescale_threshold: u32,
    /// Divisor applied on rescale
    pub rescale_decimator: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_token_count: 3,
            max_token_length: 24,
            max_age: 60 * 60 * 24 * 365,
            rescale_threshold: 1000,
            rescale_decimator: 3,
        }
    }
}

/// Search and rendering parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Worker threads per context
    pub max_parallel_searches: usize,
    /// Keywords sampled per request
    pub tokens_initial: usize,
    /// Fragments per keyword and direction
    pub search_branches_initial: usize,
    /// Boundary-adjacent fragments per keyword and direction
    pub search_branches_from_boundary_initial: usize,
    /// Candidate extensions tried at each step
    pub search_branches_children: usize,
    /// Productions shorter than this are penalised and never stop early
    pub min_length: usize,
    /// Hard bound on production length
    pub max_length: usize,
    /// Stop chance at a terminus below the target band
    pub stop_probability: f32,
    /// Start of the target length band
    pub target_min_length: usize,
    /// End of the target length band; past it a terminus always stops
    pub target_max_length: usize,
    /// Stop chance at a terminus inside the target band
    pub target_stop_probability: f32,
    /// Share the base spelling needs to be shown as-is
    pub base_representation_threshold: f32,
    /// Add forward surprise to the tie-break
    pub calculate_surprise_forward: bool,
    /// Add reverse surprise to the tie-break
    pub calculate_surprise_reverse: bool,
    /// Fixed seed for reproducible output
    pub seed: Option<u64>,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            max_parallel_searches: 4,
            tokens_initial: 3,
            search_branches_initial: 4,
            search_branches_from_boundary_initial: 2,
            search_branches_children: 2,
            min_length: 4,
            max_length: 32,
            stop_probability: 0.2,
            target_min_length: 6,
            target_max_length: 16,
            target_stop_probability: 0.5,
            base_representation_threshold: 0.75,
            calculate_surprise_forward: true,
            calculate_surprise_reverse: true,
            seed: None,
        }
    }
}

impl ProductionConfig {
    /// Chance of stopping at a terminus once the floor is met.
    pub fn stop_chance(&self, length: usize) -> f32 {
        if length < self.target_min_length {
            self.stop_probability
        } else if length <= self.target_max_length {
            self.target_stop_probability
        } else {
            1.0
        }
    }
}

/// Everything read from `contexts/<id>.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Language front-end name
    pub language: String,
    /// Enabled orders
    pub ngrams: NgramConfig,
    /// Learning thresholds
    pub learning: LearningConfig,
    /// Search parameters
    pub production: ProductionConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            ngrams: NgramConfig::default(),
            learning: LearningConfig::default(),
            production: ProductionConfig::default(),
        }
    }
}

impl ContextConfig {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ContextConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(EngineError::InvalidConfig(msg.to_string())) };
        let p = &self.production;
        if self.ngrams.enabled().is_empty() {
            return invalid("no n-gram order enabled");
        }
        if self.learning.rescale_decimator < 2 {
            return invalid("rescale_decimator must be at least 2");
        }
        if self.learning.max_age < 0 {
            return invalid("max_age must not be negative");
        }
        if p.max_parallel_searches == 0 {
            return invalid("max_parallel_searches must be at least 1");
        }
        if p.tokens_initial == 0 {
            return invalid("tokens_initial must be at least 1");
        }
        if p.search_branches_children == 0 {
            return invalid("search_branches_children must be at least 1");
        }
        if p.max_length == 0 || p.min_length > p.max_length {
            return invalid("min_length must not exceed max_length");
        }
        if p.target_min_length > p.target_max_length {
            return invalid("target_min_length must not exceed target_max_length");
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&p.stop_probability)
            || !unit.contains(&p.target_stop_probability)
            || !unit.contains(&p.base_representation_threshold)
        {
            return invalid("probabilities and thresholds must lie in [0, 1]");
        }
        Ok(())
    }

    /// Oldest edge timestamp still honoured at `now`.
    pub fn oldest_allowed(&self, now: i64) -> i64 {
        if self.learning.max_age == 0 {
            i64::MIN
        } else {
            now.saturating_sub(self.learning.max_age)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() -> Result<()> {
        let config: ContextConfig = serde_json::from_str(
            r#"{"language": "english", "ngrams": {"quintgrams": true}, "production": {"min_length": 2, "seed": 9}}"#,
        )?;
        assert!(config.ngrams.digrams && config.ngrams.quintgrams);
        assert_eq!(config.ngrams.enabled(), Order::ALL.to_vec());
        assert_eq!(config.production.min_length, 2);
        assert_eq!(config.production.seed, Some(9));
        assert_eq!(config.learning, LearningConfig::default());
        config.validate()
    }

    #[test]
    fn validation_rejects_nonsense() {
        let mut config = ContextConfig::default();
        config.ngrams = NgramConfig { digrams: false, trigrams: false, quadgrams: false, quintgrams: false };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let mut config = ContextConfig::default();
        config.learning.rescale_decimator = 1;
        assert!(config.validate().is_err());

        let mut config = ContextConfig::default();
        config.production.stop_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = ContextConfig::default();
        config.production.min_length = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_keywords_or_children_are_rejected() {
        let mut config = ContextConfig::default();
        config.production.tokens_initial = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(m)) if m.contains("tokens_initial")));

        let mut config = ContextConfig::default();
        config.production.search_branches_children = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(m)) if m.contains("search_branches_children")));
    }

    #[test]
    fn stop_chance_bands() {
        let p = ProductionConfig::default();
        assert_eq!(p.stop_chance(p.target_min_length - 1), p.stop_probability);
        assert_eq!(p.stop_chance(p.target_min_length), p.target_stop_probability);
        assert_eq!(p.stop_chance(p.target_max_length), p.target_stop_probability);
        assert_eq!(p.stop_chance(p.target_max_length + 1), 1.0);
    }

    #[test]
    fn zero_max_age_keeps_everything() {
        let mut config = ContextConfig::default();
        assert_eq!(config.oldest_allowed(1_000_000), 1_000_000 - config.learning.max_age);
        config.learning.max_age = 0;
        assert_eq!(config.oldest_allowed(1_000_000), i64::MIN);
    }
}
