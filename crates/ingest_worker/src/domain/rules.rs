use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One entry of the rules table as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleConfig {
    pub regex: String,
    #[serde(default)]
    pub store_payload: bool,
    /// Zero means "use the default TTL"
    #[serde(default)]
    pub ttl_secs: u64,
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid rule pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no rule matches destination '{0}'")]
    NoMatchingRule(String),
}

/// Retention policy for destinations matching `pattern`
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    store_payload: bool,
    ttl: Duration,
}

impl Rule {
    pub fn new(pattern: &str, store_payload: bool, ttl: Duration) -> Result<Self, RuleError> {
        let pattern = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern,
            store_payload,
            ttl,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn store_payload(&self) -> bool {
        self.store_payload
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn matches(&self, destination: &str) -> bool {
        self.pattern.is_match(destination)
    }
}

impl TryFrom<&RuleConfig> for Rule {
    type Error = RuleError;

    fn try_from(config: &RuleConfig) -> Result<Self, Self::Error> {
        Rule::new(
            &config.regex,
            config.store_payload,
            Duration::from_secs(config.ttl_secs),
        )
    }
}

/// Ordered, immutable rule table. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Compile every configured pattern; any invalid pattern fails the whole table
    pub fn from_configs(configs: &[RuleConfig]) -> Result<Self, RuleError> {
        let rules = configs
            .iter()
            .map(Rule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rule_count = rules.len(), "compiled rule table");
        Ok(Self::new(rules))
    }

    pub fn find_rule(&self, destination: &str) -> Result<&Rule, RuleError> {
        self.rules
            .iter()
            .find(|rule| rule.matches(destination))
            .ok_or_else(|| RuleError::NoMatchingRule(destination.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
