use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::{DEFAULT_PREFIXES, FNS};

/// Engine-wide defaults, built once and shared by every compiled query.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub namespaces: HashMap<String, String>,
    pub default_function_namespace: String,
    /// XPath 1.0 compatible comparisons: a numeric operand coerces both
    /// sides to double.
    pub backwards_compatible: bool,
    /// Token distance used by `near` when the query does not give one.
    pub default_near_distance: usize,
    /// Capacity of the compiled wildcard pattern cache.
    pub pattern_cache_capacity: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            namespaces: DEFAULT_PREFIXES
                .iter()
                .map(|(p, u)| ((*p).to_string(), (*u).to_string()))
                .collect(),
            default_function_namespace: FNS.to_string(),
            backwards_compatible: false,
            default_near_distance: 1,
            pattern_cache_capacity: 64,
        }
    }
}

impl QueryConfig {
    pub fn builder() -> QueryConfigBuilder {
        QueryConfigBuilder::new()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

pub struct QueryConfigBuilder {
    cfg: QueryConfig,
}

impl Default for QueryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryConfigBuilder {
    pub fn new() -> Self {
        Self { cfg: QueryConfig::default() }
    }

    /// Register a default prefix binding. The reserved `xml` prefix cannot be
    /// rebound.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.cfg.namespaces.insert(p, uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.cfg.default_function_namespace = uri.into();
        self
    }

    pub fn with_backwards_compatible(mut self, on: bool) -> Self {
        self.cfg.backwards_compatible = on;
        self
    }

    pub fn with_default_near_distance(mut self, distance: usize) -> Self {
        self.cfg.default_near_distance = distance;
        self
    }

    pub fn with_pattern_cache_capacity(mut self, capacity: usize) -> Self {
        self.cfg.pattern_cache_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Arc<QueryConfig> {
        Arc::new(self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{TEXT_NS, XML_URI};

    #[test]
    fn defaults_seed_prefixes() {
        let cfg = QueryConfig::default();
        assert_eq!(cfg.namespaces.get("text").map(String::as_str), Some(TEXT_NS));
        assert!(!cfg.backwards_compatible);
    }

    #[test]
    fn xml_prefix_is_reserved() {
        let cfg = QueryConfig::builder().with_namespace("xml", "urn:other").build();
        assert_eq!(cfg.namespaces.get("xml").map(String::as_str), Some(XML_URI));
    }
}
