//! Static context: namespaces, variable scopes, user functions and the
//! document builder used by constructors.

use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::broker::{Broker, DocumentBuilder};
use crate::config::QueryConfig;
use crate::error::Result;
use crate::functions::{UserFunction, UserFunctionRegistry};
use crate::model::QName;
use crate::xdm::Sequence;

mod namespaces;
mod variables;

pub use namespaces::NamespaceTable;
pub use variables::{Variable, VariableStack};

/// Environment of one compiled query.
pub struct StaticContext {
    config: Arc<QueryConfig>,
    pub namespaces: NamespaceTable,
    pub default_element_namespace: Option<String>,
    pub default_function_namespace: String,
    pub variables: VariableStack,
    pub functions: UserFunctionRegistry,
    builder: Option<Box<dyn DocumentBuilder>>,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self::new(Arc::new(QueryConfig::default()))
    }
}

impl StaticContext {
    pub fn new(config: Arc<QueryConfig>) -> Self {
        Self {
            namespaces: NamespaceTable::from_config(&config),
            default_element_namespace: None,
            default_function_namespace: config.default_function_namespace.clone(),
            variables: VariableStack::new(),
            functions: UserFunctionRegistry::default(),
            builder: None,
            config,
        }
    }

    pub fn builder() -> StaticContextBuilder {
        StaticContextBuilder::new()
    }

    pub fn config(&self) -> &Arc<QueryConfig> {
        &self.config
    }

    pub fn backwards_compatible(&self) -> bool {
        self.config.backwards_compatible
    }

    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.declare(prefix, uri);
    }

    pub fn remove_namespace(&mut self, prefix: &str) -> Option<String> {
        self.namespaces.remove(prefix)
    }

    /// Element or type name; unprefixed names take the default element
    /// namespace.
    pub fn element_qname(&self, lexical: &str) -> Result<QName> {
        self.namespaces.qname(lexical, self.default_element_namespace.as_deref())
    }

    /// Function name; unprefixed names take the default function namespace.
    pub fn function_qname(&self, lexical: &str) -> Result<QName> {
        self.namespaces.qname(lexical, Some(&self.default_function_namespace))
    }

    /// Attribute and variable names never take a default namespace.
    pub fn plain_qname(&self, lexical: &str) -> Result<QName> {
        self.namespaces.qname(lexical, None)
    }

    /// Binds a global variable (visible in every scope).
    pub fn declare_global(&mut self, name: QName, value: Sequence) {
        self.variables.declare(name, value);
    }

    pub fn declare_function(&mut self, f: Rc<UserFunction>) -> Result<()> {
        self.functions.declare(f)
    }

    /// Patches calls made before their function was declared.
    pub fn resolve_forward_references(&mut self) -> Result<()> {
        let n = self.functions.resolve_forward_references()?;
        debug!(resolved = n, "forward function references resolved");
        Ok(())
    }

    /// Builder shared by all constructors of the query, created on first use.
    pub fn document_builder(&mut self, broker: &dyn Broker) -> Result<&mut dyn DocumentBuilder> {
        if self.builder.is_none() {
            debug!("creating document builder for constructed nodes");
            self.builder = Some(broker.document_builder()?);
        }
        match self.builder.as_deref_mut() {
            Some(b) => Ok(b),
            None => Err(crate::error::Error::storage("document builder unavailable")),
        }
    }
}

/// Builder for [`StaticContext`].
pub struct StaticContextBuilder {
    config: Option<Arc<QueryConfig>>,
    namespaces: Vec<(String, String)>,
    default_element_namespace: Option<String>,
    globals: Vec<(QName, Sequence)>,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self { config: None, namespaces: Vec::new(), default_element_namespace: None, globals: Vec::new() }
    }

    pub fn with_config(mut self, config: Arc<QueryConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    pub fn with_default_element_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_element_namespace = Some(uri.into());
        self
    }

    pub fn with_variable(mut self, name: QName, value: Sequence) -> Self {
        self.globals.push((name, value));
        self
    }

    pub fn build(self) -> StaticContext {
        let mut ctx = StaticContext::new(self.config.unwrap_or_default());
        for (p, u) in self.namespaces {
            ctx.namespaces.declare(p, u);
        }
        ctx.default_element_namespace = self.default_element_namespace;
        for (name, value) in self.globals {
            ctx.declare_global(name, value);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_settings() {
        let cfg = QueryConfig::builder().with_backwards_compatible(true).build();
        let ctx = StaticContext::builder()
            .with_config(cfg)
            .with_namespace("b", "urn:books")
            .with_default_element_namespace("urn:books")
            .with_variable(QName::local("limit"), Sequence::integer(3))
            .build();
        assert!(ctx.backwards_compatible());
        assert_eq!(ctx.element_qname("title").unwrap().ns_uri.as_deref(), Some("urn:books"));
        assert_eq!(ctx.plain_qname("title").unwrap().ns_uri, None);
        assert!(ctx.variables.lookup(&QName::local("limit")).is_some());
        assert_eq!(ctx.variables.depth(), 0);
    }
}
