use std::collections::BTreeSet;

use super::DocId;

/// Working set of documents, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSet(BTreeSet<DocId>);

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: DocId) -> bool {
        self.0.insert(doc)
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.0.contains(&doc)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn union(&self, other: &DocumentSet) -> DocumentSet {
        DocumentSet(self.0.union(&other.0).copied().collect())
    }

    #[must_use]
    pub fn intersection(&self, other: &DocumentSet) -> DocumentSet {
        DocumentSet(self.0.intersection(&other.0).copied().collect())
    }

    pub fn is_subset(&self, other: &DocumentSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl FromIterator<DocId> for DocumentSet {
    fn from_iter<T: IntoIterator<Item = DocId>>(iter: T) -> Self {
        DocumentSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DocumentSet {
    type Item = &'a DocId;
    type IntoIter = std::collections::btree_set::Iter<'a, DocId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
