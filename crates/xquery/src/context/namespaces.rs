use std::collections::HashMap;

use crate::config::QueryConfig;
use crate::consts::XML_URI;
use crate::error::{Error, ErrorCode, Result};
use crate::model::QName;

/// Prefix to namespace bindings of a query.
#[derive(Debug, Clone, Default)]
pub struct NamespaceTable {
    by_prefix: HashMap<String, String>,
    seed: HashMap<String, String>,
}

impl NamespaceTable {
    pub fn from_config(cfg: &QueryConfig) -> Self {
        let mut seed = cfg.namespaces.clone();
        seed.insert("xml".to_string(), XML_URI.to_string());
        Self { by_prefix: seed.clone(), seed }
    }

    /// Binds `prefix`. The `xml` prefix is fixed and silently kept.
    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let p = prefix.into();
        if p == "xml" {
            return;
        }
        self.by_prefix.insert(p, uri.into());
    }

    pub fn remove(&mut self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return None;
        }
        self.by_prefix.remove(prefix)
    }

    /// Drops every declaration made after construction.
    pub fn reset(&mut self) {
        self.by_prefix = self.seed.clone();
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.by_prefix
            .iter()
            .filter(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
            .min()
    }

    /// Resolves a lexical `prefix:local` name; unprefixed names take
    /// `default_ns`.
    pub fn qname(&self, lexical: &str, default_ns: Option<&str>) -> Result<QName> {
        match lexical.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.resolve(prefix).ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0008, format!("no namespace bound to prefix '{prefix}'"))
                })?;
                Ok(QName::new(Some(uri), local).with_prefix(prefix))
            }
            None => Ok(QName::new(default_ns.filter(|ns| !ns.is_empty()), lexical)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FNS;

    #[test]
    fn declare_and_reset() {
        let mut ns = NamespaceTable::from_config(&QueryConfig::default());
        ns.declare("b", "urn:books");
        ns.declare("xml", "urn:nope");
        assert_eq!(ns.resolve("b"), Some("urn:books"));
        assert_eq!(ns.resolve("xml"), Some(XML_URI));
        let q = ns.qname("b:title", None).unwrap();
        assert_eq!(q.ns_uri.as_deref(), Some("urn:books"));
        ns.reset();
        assert!(ns.resolve("b").is_none());
        assert_eq!(ns.qname("count", Some(FNS)).unwrap().ns_uri.as_deref(), Some(FNS));
        assert!(ns.qname("zz:x", None).is_err());
    }
}
