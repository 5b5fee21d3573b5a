use rstest::{fixture, rstest};
use xmldb_xquery::model::{ContextId, MatchSpan, NodeId, Recording, SiblingDirection};
use xmldb_xquery::{DocId, NodeCollection, NodeHandle, NodeKind};

fn el(doc: u32, path: &[u32]) -> NodeHandle {
    NodeHandle::new(DocId(doc), NodeId::from_slice(path), NodeKind::Element)
}

/// Two documents, each with a document element holding `width` sections of
/// `width` items.
struct Forest {
    sections: NodeCollection,
    items: NodeCollection,
    roots: NodeCollection,
}

#[fixture]
fn forest() -> Forest {
    let width = 4;
    let mut sections = Vec::new();
    let mut items = Vec::new();
    let mut roots = Vec::new();
    for doc in [2, 1] {
        roots.push(el(doc, &[1]));
        for s in 1..=width {
            sections.push(el(doc, &[1, s]));
            for i in 1..=width {
                items.push(el(doc, &[1, s, i]));
            }
        }
    }
    Forest {
        sections: NodeCollection::from_unsorted(sections),
        items: NodeCollection::from_unsorted(items),
        roots: NodeCollection::from_unsorted(roots),
    }
}

fn is_document_ordered(c: &NodeCollection) -> bool {
    c.as_slice().windows(2).all(|w| w[0] < w[1])
}

fn evens(c: &NodeCollection) -> NodeCollection {
    c.filter(|n| n.id.components().last().is_some_and(|x| x % 2 == 0))
}

#[rstest]
fn from_unsorted_orders_and_deduplicates() {
    let c = NodeCollection::from_unsorted(vec![el(1, &[1, 2]), el(0, &[1]), el(1, &[1, 2]), el(1, &[1])]);
    assert_eq!(c.len(), 3);
    assert!(is_document_ordered(&c));
    assert_eq!(c.first(), Some(&el(0, &[1])));
}

#[rstest]
fn union_is_ordered_and_covers_both(forest: Forest) {
    let u = forest.sections.union(&forest.items);
    assert!(is_document_ordered(&u));
    assert_eq!(u.len(), forest.sections.len() + forest.items.len());
    assert!(forest.sections.iter().chain(forest.items.iter()).all(|n| u.contains(n)));
    assert_eq!(forest.items.union(&forest.items).len(), forest.items.len());
    assert_eq!(forest.items.union(&NodeCollection::new()).as_slice(), forest.items.as_slice());
}

#[rstest]
fn intersection_and_difference_partition(forest: Forest) {
    let some = evens(&forest.items);
    let both = forest.items.intersection(&some);
    let rest = forest.items.difference(&some);
    assert!(is_document_ordered(&both));
    assert!(is_document_ordered(&rest));
    assert_eq!(both.as_slice(), some.as_slice());
    assert_eq!(both.len() + rest.len(), forest.items.len());
    assert!(rest.iter().all(|n| !some.contains(n)));
    assert!(forest.items.intersection(&forest.sections).is_empty());
}

#[rstest]
fn children_and_parents_invert(forest: Forest) {
    let picked = evens(&forest.sections);
    let children = picked.select_children(&forest.items, Recording::Off);
    assert_eq!(children.len(), picked.len() * 4);
    assert!(children.iter().all(|c| picked.iter().any(|p| c.is_child_of(p))));
    let parents = children.select_parents(&forest.sections, Recording::Off);
    assert_eq!(parents.as_slice(), picked.as_slice());
}

#[rstest]
fn descendants_and_ancestors(forest: Forest) {
    let below = forest.roots.select_descendants(&forest.items, false, Recording::Off);
    assert_eq!(below.as_slice(), forest.items.as_slice());
    let with_self = forest.roots.select_descendants(&forest.roots, true, Recording::Off);
    assert_eq!(with_self.len(), forest.roots.len());
    assert!(forest.roots.select_descendants(&forest.roots, false, Recording::Off).is_empty());

    let one = NodeCollection::singleton(el(1, &[1, 3, 2]));
    let up = one.select_ancestors(&forest.sections.union(&forest.roots), false, Recording::Off);
    assert_eq!(up.as_slice(), &[el(1, &[1]), el(1, &[1, 3])]);
}

#[rstest]
#[case(SiblingDirection::Following, vec![3, 4])]
#[case(SiblingDirection::Preceding, vec![1])]
fn siblings_share_a_parent(forest: Forest, #[case] direction: SiblingDirection, #[case] expected: Vec<u32>) {
    let ctx = NodeCollection::singleton(el(1, &[1, 2]));
    let out = ctx.select_siblings(&forest.sections, direction, Recording::Off);
    let want: Vec<NodeHandle> = expected.iter().map(|s| el(1, &[1, *s])).collect();
    assert_eq!(out.as_slice(), want.as_slice());
}

#[rstest]
fn following_and_preceding_skip_the_context_subtree(forest: Forest) {
    let ctx = NodeCollection::singleton(el(1, &[1, 2]));
    let after = ctx.select_following(&forest.items, Recording::Off);
    assert_eq!(after.len(), 8);
    assert!(after.iter().all(|n| n.doc == DocId(1) && n.id.components()[1] > 2));
    let before = ctx.select_preceding(&forest.items.union(&forest.roots), Recording::Off);
    assert_eq!(before.len(), 4);
}

#[rstest]
fn recorded_contexts_point_back(forest: Forest) {
    let id = ContextId(7);
    let children = forest.sections.select_children(&forest.items, Recording::Record(id));
    for c in &children {
        assert_eq!(children.contexts_of(c, id), vec![c.parent().unwrap()]);
    }
    let plain = forest.sections.select_children(&forest.items, Recording::Off);
    assert!(plain.contexts_of(plain.first().unwrap(), id).is_empty());
}

#[rstest]
fn containing_moves_matches_to_the_nearest_container(forest: Forest) {
    let hit = el(1, &[1, 2, 3]);
    let mut hits = NodeCollection::singleton(hit.clone());
    hits.add_match(&hit, MatchSpan { node: hit.clone(), offset: 0, length: 4, term: "word".into() });
    let scope = forest.sections.union(&forest.roots);
    let found = scope.select_containing(&hits);
    assert_eq!(found.as_slice(), &[el(1, &[1, 2])]);
    assert_eq!(found.match_count(), 1);
}
