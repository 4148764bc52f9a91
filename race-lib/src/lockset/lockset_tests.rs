use std::collections::{BTreeSet, HashMap};

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::access::{AccessKind, extract};
use crate::ir::{AccessExpr, Base, MethodAnnotations, MethodId};
use crate::test_utils::{acquire, call, field_lock, method, read, release, straight_line, write};

fn field_lock_id(class: &str, field: &str) -> LockId {
    LockId::Field(AccessPath::field(class, field))
}

fn track(method: &MethodRecord) -> TaggedMethod {
    LockSetTracker::default()
        .track(method, &extract(method))
        .unwrap()
}

fn locks_of(tagged: &TaggedMethod) -> Vec<LockSet> {
    tagged.accesses.iter().map(|a| a.locks.clone()).collect()
}

#[test]
fn lock_set_order_and_display() {
    let a: LockSet = [field_lock_id("A", "l")].into_iter().collect();
    let ab: LockSet = [field_lock_id("A", "l"), LockId::Class("A".to_owned())]
        .into_iter()
        .collect();
    let c: LockSet = [LockId::This].into_iter().collect();
    assert!(a < ab);
    assert_eq!(a.partial_cmp(&c), None);
    assert_eq!(ab.intersection(&a), a);
    assert_eq!(a.union(&c).len(), 2);
    assert!(a.is_disjoint(&c));
    assert_eq!(ab.to_string(), "{A.l, A.class}");
    assert_eq!(LockSet::new().to_string(), "{}");
}

#[test]
fn canonical_lock_names() {
    assert_eq!(LockId::canonicalize(&LockExpr::This), Some(LockId::This));
    assert_eq!(LockId::This.to_string(), "this");
    assert_eq!(
        LockId::canonicalize(&field_lock("A", "l")),
        Some(field_lock_id("A", "l"))
    );
    let local = LockExpr::Field {
        target: AccessExpr {
            base: Base::Local {
                name: "m".to_owned(),
            },
            selectors: Vec::new(),
        },
    };
    assert_eq!(LockId::canonicalize(&local), None);
}

#[test]
fn acquire_and_release_in_sequence() {
    let cfg = straight_line(vec![
        read("A", "f"),
        acquire(field_lock("A", "l")),
        write("A", "f"),
        acquire(LockExpr::This),
        read("A", "g"),
        release(field_lock("A", "l")),
        write("A", "g"),
        release(field_lock("A", "other")),
    ]);
    let tagged = track(&method(0, "A", "run", cfg));
    let l = field_lock_id("A", "l");
    let this = LockId::This;
    assert_eq!(
        locks_of(&tagged),
        vec![
            LockSet::new(),
            [l.clone()].into_iter().collect(),
            [l, this.clone()].into_iter().collect(),
            [this].into_iter().collect(),
        ]
    );
}

#[test]
fn merge_keeps_locks_held_on_both_branches() {
    //      0: acquire l
    //     / \
    //    1   2: acquire m
    //     \ /
    //      3: write f
    let mut cfg = Cfg::new();
    for _ in 0..4 {
        cfg.new_block();
    }
    cfg.add_edge(0, 1)
        .add_edge(0, 2)
        .add_edge(1, 3)
        .add_edge(2, 3)
        .push_op(0, Operation::new(1, acquire(field_lock("A", "l"))))
        .push_op(2, Operation::new(2, acquire(field_lock("A", "m"))))
        .push_op(2, Operation::new(3, read("A", "f")))
        .push_op(3, Operation::new(4, write("A", "f")));
    let tagged = track(&method(0, "A", "run", cfg));
    assert_eq!(
        locks_of(&tagged),
        vec![
            [field_lock_id("A", "l"), field_lock_id("A", "m")]
                .into_iter()
                .collect(),
            [field_lock_id("A", "l")].into_iter().collect(),
        ]
    );
}

#[test]
fn lock_released_inside_loop_is_not_held_at_head() {
    //   0: acquire l
    //   |
    //   1: write f  <-+
    //   |             |
    //   2: release l -+
    //   |
    //   3: read f
    let mut cfg = Cfg::new();
    for _ in 0..4 {
        cfg.new_block();
    }
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .add_edge(2, 1)
        .add_edge(2, 3)
        .push_op(0, Operation::new(1, acquire(field_lock("A", "l"))))
        .push_op(1, Operation::new(2, write("A", "f")))
        .push_op(2, Operation::new(3, release(field_lock("A", "l"))))
        .push_op(3, Operation::new(4, read("A", "f")));
    let tagged = track(&method(0, "A", "spin", cfg));
    assert_eq!(locks_of(&tagged), vec![LockSet::new(), LockSet::new()]);
    assert!(tagged.steps > 4);
}

#[test]
fn synchronized_and_guarded_methods_start_with_locks() {
    let mut record = method(0, "A", "update", straight_line(vec![write("A", "f")]));
    record.annotations = MethodAnnotations {
        synchronized: true,
        guarded_by: Some(LockExpr::Class {
            name: "Registry".to_owned(),
        }),
        ..MethodAnnotations::default()
    };
    let tagged = track(&record);
    assert_eq!(
        locks_of(&tagged),
        vec![
            [
                LockId::This,
                LockId::Class("Registry".to_owned())
            ]
            .into_iter()
            .collect()
        ]
    );
}

#[test]
fn call_sites_include_locks_held_for_the_call() {
    let cfg = straight_line(vec![
        acquire(LockExpr::This),
        OpKind::Call {
            callee: MethodId(5),
            locks_held: vec![field_lock("A", "l")],
        },
        release(LockExpr::This),
        call(MethodId(6)),
    ]);
    let tagged = track(&method(0, "A", "run", cfg));
    assert_eq!(tagged.calls.len(), 2);
    assert_eq!(tagged.calls[0].call.callee, MethodId(5));
    assert_eq!(
        tagged.calls[0].locks,
        [LockId::This, field_lock_id("A", "l")]
            .into_iter()
            .collect()
    );
    assert_eq!(tagged.calls[1].locks, LockSet::new());
}

#[test]
fn unreachable_blocks_are_dropped() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_block();
    let dead = cfg.new_block();
    cfg.push_op(entry, Operation::new(1, read("A", "f")))
        .push_op(dead, Operation::new(2, write("A", "f")))
        .push_op(dead, Operation::new(3, call(MethodId(1))));
    let record = method(0, "A", "run", cfg);
    let extraction = extract(&record);
    assert_eq!(extraction.items.len(), 3);

    let tagged = track(&record);
    assert_eq!(tagged.accesses.len(), 1);
    assert_eq!(tagged.accesses[0].access.kind, AccessKind::Read);
    assert!(tagged.calls.is_empty());
}

#[test]
fn unnamed_locks_protect_nothing() {
    let unknown = LockExpr::Field {
        target: AccessExpr {
            base: Base::Unresolved,
            selectors: Vec::new(),
        },
    };
    let cfg = straight_line(vec![acquire(unknown.clone()), write("A", "f"), release(unknown)]);
    let tagged = track(&method(0, "A", "run", cfg));
    assert_eq!(locks_of(&tagged), vec![LockSet::new()]);
}

#[test]
fn budget_exhaustion_and_fallback() {
    let mut cfg = Cfg::new();
    for _ in 0..3 {
        cfg.new_block();
    }
    cfg.add_edge(0, 1)
        .add_edge(1, 2)
        .push_op(0, Operation::new(1, acquire(LockExpr::This)))
        .push_op(2, Operation::new(2, write("A", "f")))
        .push_op(2, Operation::new(3, call(MethodId(1))));
    let record = method(0, "A", "run", cfg);
    let extraction = extract(&record);

    let tracker = LockSetTracker { budget: Some(2) };
    assert_eq!(
        tracker.track(&record, &extraction),
        Err(SolverError::StepLimit { limit: 2 })
    );
    let enough = LockSetTracker { budget: Some(3) };
    assert!(enough.track(&record, &extraction).is_ok());

    let fallback = LockSetTracker::untracked(&extraction);
    assert_eq!(locks_of(&fallback), vec![LockSet::new()]);
    assert_eq!(fallback.calls.len(), 1);
    assert_eq!(fallback.calls[0].locks, LockSet::new());
}

//////////////////////////////////////////////
// Held locks never exceed any concrete path //
//////////////////////////////////////////////

const LOCKS: usize = 3;

#[derive(Clone, Debug)]
enum Step {
    Acquire(usize),
    Release(usize),
    Access,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..LOCKS).prop_map(Step::Acquire),
        (0..LOCKS).prop_map(Step::Release),
        Just(Step::Access),
    ]
}

/// Blocks with their steps and forward edges only, so every path is finite.
fn arb_acyclic_method() -> impl Strategy<Value = (Vec<Vec<Step>>, Vec<(usize, usize)>)> {
    (1usize..6).prop_flat_map(|blocks| {
        let steps = prop::collection::vec(prop::collection::vec(arb_step(), 0..5), blocks);
        let pairs: Vec<(usize, usize)> = (0..blocks)
            .flat_map(|from| (from + 1..blocks).map(move |to| (from, to)))
            .collect();
        let edges = prop::collection::vec(any::<bool>(), pairs.len()).prop_map(move |keep| {
            pairs
                .iter()
                .zip(keep)
                .filter_map(|(&pair, keep)| keep.then_some(pair))
                .collect::<Vec<_>>()
        });
        (steps, edges)
    })
}

fn lock_name(lock: usize) -> String {
    format!("l{lock}")
}

fn build(blocks: &[Vec<Step>], edges: &[(usize, usize)]) -> MethodRecord {
    let mut cfg = Cfg::new();
    for _ in blocks {
        cfg.new_block();
    }
    for &(from, to) in edges {
        cfg.add_edge(from, to);
    }
    let mut line = 0;
    for (block, steps) in blocks.iter().enumerate() {
        for step in steps {
            line += 1;
            let kind = match step {
                Step::Acquire(lock) => acquire(field_lock("A", &lock_name(*lock))),
                Step::Release(lock) => release(field_lock("A", &lock_name(*lock))),
                Step::Access => write("A", "f"),
            };
            cfg.push_op(block, Operation::new(line, kind));
        }
    }
    method(0, "A", "random", cfg)
}

/// Concrete held locks before every access, one entry per path reaching it.
fn concrete_states(
    blocks: &[Vec<Step>],
    edges: &[(usize, usize)],
) -> HashMap<(usize, usize), Vec<BTreeSet<usize>>> {
    fn walk(
        block: usize,
        mut held: BTreeSet<usize>,
        blocks: &[Vec<Step>],
        edges: &[(usize, usize)],
        states: &mut HashMap<(usize, usize), Vec<BTreeSet<usize>>>,
    ) {
        for (op, step) in blocks[block].iter().enumerate() {
            match step {
                Step::Acquire(lock) => {
                    held.insert(*lock);
                }
                Step::Release(lock) => {
                    held.remove(lock);
                }
                Step::Access => states.entry((block, op)).or_default().push(held.clone()),
            }
        }
        for &(from, to) in edges {
            if from == block {
                walk(to, held.clone(), blocks, edges, states);
            }
        }
    }

    let mut states = HashMap::new();
    walk(0, BTreeSet::new(), blocks, edges, &mut states);
    states
}

proptest! {
    #[test]
    fn held_locks_under_approximate_every_path((blocks, edges) in arb_acyclic_method()) {
        let record = build(&blocks, &edges);
        let tagged = track(&record);
        let concrete = concrete_states(&blocks, &edges);

        prop_assert_eq!(tagged.accesses.len(), concrete.len());
        for access in &tagged.accesses {
            let key = (access.access.location.block, access.access.location.op);
            let paths = concrete.get(&key);
            prop_assert!(paths.is_some());
            for held in paths.into_iter().flatten() {
                let held: LockSet = held
                    .iter()
                    .map(|&lock| field_lock_id("A", &lock_name(lock)))
                    .collect();
                prop_assert!(access.locks.is_subset(&held));
            }
        }
    }
}
