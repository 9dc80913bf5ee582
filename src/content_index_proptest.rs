#![cfg(test)]

// Property tests for ContentIndex kept inside the crate so they do not
// require feature gates to access internal modules.

use crate::atom::{Atom, Link, Node};
use crate::content_index::{ContentIndex, InsertError, Slot};
use crate::handle::Handle;
use crate::types::{registry, Equivalence, Type};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};

// Pool-indexed shapes so shrinking moves toward earlier names and shorter
// operation lists.
#[derive(Clone, Copy, Debug)]
enum Shape {
    Node(usize),
    Pair(usize, usize),
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Shape),
    Remove(Shape),
    Find(Shape),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,3}", 1..=6).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let shape = prop_oneof![
            idx.clone().prop_map(Shape::Node),
            (idx.clone(), idx.clone()).prop_map(|(i, j)| Shape::Pair(i, j)),
        ];
        let op = prop_oneof![
            3 => shape.clone().prop_map(Op::Insert),
            2 => shape.clone().prop_map(Op::Remove),
            2 => shape.prop_map(Op::Find),
            1 => Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Every call builds fresh atoms, so equal shapes are content-equal but never
// identical.
fn build(node_type: Type, pool: &[String], shape: Shape) -> Handle {
    let node = |i: usize| Node::new(node_type, pool[i].as_str()).unwrap();
    match shape {
        Shape::Node(i) => node(i),
        Shape::Pair(i, j) => Link::new(Type::LIST_LINK, vec![node(i), node(j)]).unwrap(),
    }
}

fn run_state_machine(node_type: Type, pool: &[String], ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut sut = ContentIndex::new();
    // The printed form is unique per content, so it keys the model.
    let mut model: HashMap<String, (Handle, Slot)> = HashMap::new();
    let mut stale: Vec<Slot> = Vec::new();

    for op in ops {
        match op {
            Op::Insert(s) => {
                let h = build(node_type, pool, s);
                let key = h.to_string();
                match sut.insert(h.clone()) {
                    Ok(slot) => {
                        prop_assert!(!model.contains_key(&key), "insert must fail on duplicate content");
                        prop_assert_eq!(sut.get(slot), Some(&h));
                        model.insert(key, (h, slot));
                    }
                    Err(InsertError::DuplicateContent(slot)) => {
                        let tracked = model.get(&key).map(|(_, s)| *s);
                        prop_assert_eq!(Some(slot), tracked, "duplicate must report the live slot");
                    }
                    Err(InsertError::InvalidHandle) => prop_assert!(false, "valid handle rejected"),
                }
            }
            Op::Remove(s) => {
                let probe = build(node_type, pool, s);
                match model.remove(&probe.to_string()) {
                    Some((h, slot)) => {
                        // A content-equal twin is not the stored atom.
                        prop_assert!(sut.remove(&probe).is_none());
                        prop_assert_eq!(sut.remove(&h), Some(h.clone()));
                        stale.push(slot);
                    }
                    None => {
                        prop_assert!(sut.remove(&probe).is_none());
                        prop_assert!(sut.find(&probe).is_none());
                    }
                }
            }
            Op::Find(s) => {
                let probe = build(node_type, pool, s);
                let found = sut.find_handle(&probe).cloned();
                let expected = model.get(&probe.to_string()).map(|(h, _)| h.clone());
                prop_assert_eq!(found, expected);
                prop_assert!(!sut.contains(&probe));
            }
            Op::Iterate => {
                let s_keys: BTreeSet<String> = sut.iter().map(|(_, h)| h.to_string()).collect();
                let m_keys: BTreeSet<String> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
            }
        }

        // Post-conditions after each op
        for &slot in &stale {
            prop_assert!(sut.get(slot).is_none());
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        for (h, _) in model.values() {
            prop_assert!(sut.contains(h));
        }
    }
    Ok(())
}

// Property: State-machine equivalence against a HashMap keyed by content.
// Invariants exercised across random operation sequences:
// - Content-equal inserts are rejected and report the live slot.
// - `find` is by content, `contains`/`remove` by identity.
// - Removal invalidates the slot; stale slots never resolve.
// - `iter` yields each live entry exactly once; `len` parity with the model.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_state_machine(Type::CONCEPT_NODE, &pool, ops)?;
    }
}

fn name_eq(a: &Atom, b: &Atom) -> bool {
    a.name().ok() == b.name().ok()
}

fn constant_hash(_: &Atom) -> u64 {
    7
}

fn colliding_node_type() -> Type {
    let t = registry()
        .declare("CollidingTestNode", Type::NODE)
        .unwrap();
    registry()
        .set_equivalence(
            t,
            Equivalence {
                eq: name_eq,
                hash: constant_hash,
            },
        )
        .unwrap();
    t
}

// Property: Same invariants under worst-case collisions. Every node of the
// test type hashes to one value, and so does every pair link built from
// them, which stresses equality probing in the index.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_state_machine(colliding_node_type(), &pool, ops)?;
    }
}
