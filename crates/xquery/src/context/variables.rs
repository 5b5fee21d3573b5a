use crate::model::QName;
use crate::types::SequenceType;
use crate::xdm::Sequence;

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: QName,
    pub value: Sequence,
    pub declared_type: Option<SequenceType>,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    start: usize,
    /// Function bodies cannot see the locals of their caller.
    barrier: bool,
}

/// LIFO stack of variable scopes. Bindings made before the first scope are
/// globals and stay visible everywhere.
#[derive(Debug, Clone, Default)]
pub struct VariableStack {
    vars: Vec<Variable>,
    scopes: Vec<Scope>,
}

impl VariableStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) -> usize {
        self.scopes.push(Scope { start: self.vars.len(), barrier: false });
        self.scopes.len() - 1
    }

    pub fn push_function_scope(&mut self) -> usize {
        self.scopes.push(Scope { start: self.vars.len(), barrier: true });
        self.scopes.len() - 1
    }

    pub fn pop_scope(&mut self) {
        if let Some(s) = self.scopes.pop() {
            self.vars.truncate(s.start);
        }
    }

    /// Closes scopes until `depth` remain.
    pub fn truncate_to(&mut self, depth: usize) {
        while self.scopes.len() > depth {
            self.pop_scope();
        }
    }

    /// Binds in the innermost scope, shadowing outer bindings.
    pub fn declare(&mut self, name: QName, value: Sequence) {
        self.vars.push(Variable { name, value, declared_type: None });
    }

    pub fn declare_typed(&mut self, name: QName, value: Sequence, declared_type: SequenceType) {
        self.vars.push(Variable { name, value, declared_type: Some(declared_type) });
    }

    /// Rebinds the innermost visible binding of `name`, declaring it when
    /// absent.
    pub fn set(&mut self, name: &QName, value: Sequence) {
        if let Some(idx) = self.position(name) {
            self.vars[idx].value = value;
        } else {
            self.declare(name.clone(), value);
        }
    }

    pub fn lookup(&self, name: &QName) -> Option<&Variable> {
        self.position(name).map(|i| &self.vars[i])
    }

    pub fn is_declared(&self, name: &QName) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &QName) -> Option<usize> {
        let globals = self.scopes.first().map_or(self.vars.len(), |s| s.start);
        let visible_from = self
            .scopes
            .iter()
            .rev()
            .find(|s| s.barrier)
            .map_or(0, |s| s.start);
        (visible_from..self.vars.len())
            .rev()
            .chain((0..globals.min(visible_from)).rev())
            .find(|&i| &self.vars[i].name == name)
    }
}
