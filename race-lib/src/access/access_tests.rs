use pretty_assertions::assert_eq;

use super::*;
use crate::ir::{Cfg, Operation};
use crate::test_utils::{call, method, read, straight_line, write};

#[test]
fn receiver_does_not_matter() {
    let through_this = AccessPath::canonicalize(&AccessExpr::this_field("A", "f"));
    let through_local = AccessPath::canonicalize(&AccessExpr::local_field("other", "A", "f"));
    assert_eq!(through_this, Resolution::Path(AccessPath::field("A", "f")));
    assert_eq!(through_this, through_local);
}

#[test]
fn field_chain_is_rooted_at_first_declaring_class() {
    let expr = AccessExpr::this_field("A", "inner").field("Inner", "count");
    let Resolution::Path(path) = AccessPath::canonicalize(&expr) else {
        panic!("expected a path");
    };
    assert_eq!(path.to_string(), "A.inner.count");
    assert_eq!(path, AccessPath::field("A", "inner").then_field("count"));
}

#[test]
fn element_collapses_the_rest_of_the_chain() {
    let expr = AccessExpr::this_field("A", "items")
        .element()
        .field("Item", "value");
    let Resolution::Path(path) = AccessPath::canonicalize(&expr) else {
        panic!("expected a path");
    };
    assert_eq!(path.to_string(), "A.items[*]");
    assert_eq!(path.segments().last(), Some(&Segment::Element));
}

#[test]
fn static_field_resolves_like_instance_field() {
    let expr = AccessExpr {
        base: Base::Static {
            class: "Registry".to_owned(),
        },
        selectors: vec![Selector::Field {
            class: "Registry".to_owned(),
            name: "entries".to_owned(),
        }],
    };
    assert_eq!(
        AccessPath::canonicalize(&expr),
        Resolution::Path(AccessPath::field("Registry", "entries"))
    );
}

#[test]
fn locals_are_not_heap_accesses() {
    let expr = AccessExpr {
        base: Base::Local {
            name: "x".to_owned(),
        },
        selectors: Vec::new(),
    };
    assert_eq!(AccessPath::canonicalize(&expr), Resolution::NotHeap);
}

#[test]
fn unresolvable_expressions() {
    let reflective = AccessExpr {
        base: Base::Unresolved,
        selectors: vec![Selector::Field {
            class: "A".to_owned(),
            name: "f".to_owned(),
        }],
    };
    assert!(matches!(
        AccessPath::canonicalize(&reflective),
        Resolution::Unresolved(_)
    ));

    let local_array = AccessExpr {
        base: Base::Local {
            name: "buffer".to_owned(),
        },
        selectors: vec![Selector::Element],
    };
    assert!(matches!(
        AccessPath::canonicalize(&local_array),
        Resolution::Unresolved(_)
    ));
}

#[test]
fn extract_keeps_program_order() {
    let cfg = straight_line(vec![
        read("A", "f"),
        call(MethodId(3)),
        OpKind::Nop,
        write("A", "g"),
    ]);
    let extraction = extract(&method(1, "A", "run", cfg));
    assert!(extraction.skipped.is_empty());

    let location = |line: u32, op: usize| Location {
        method: MethodId(1),
        line,
        block: 0,
        op,
    };
    assert_eq!(
        extraction.items,
        vec![
            Extracted::Access(RawAccess {
                path: AccessPath::field("A", "f"),
                kind: AccessKind::Read,
                location: location(1, 0),
            }),
            Extracted::Call(CallMarker {
                callee: MethodId(3),
                location: location(2, 1),
            }),
            Extracted::Access(RawAccess {
                path: AccessPath::field("A", "g"),
                kind: AccessKind::Write,
                location: location(4, 3),
            }),
        ]
    );
}

#[test]
fn extract_records_skipped_accesses() {
    let mut cfg = Cfg::new();
    let entry = cfg.new_block();
    let exit = cfg.new_block();
    cfg.push_op(
        entry,
        Operation::new(
            7,
            OpKind::Write {
                target: AccessExpr {
                    base: Base::Unresolved,
                    selectors: Vec::new(),
                },
            },
        ),
    )
    .push_op(exit, Operation::new(8, read("A", "f")))
    .add_edge(entry, exit);

    let extraction = extract(&method(2, "A", "reflect", cfg));
    assert_eq!(extraction.items.len(), 1);
    assert_eq!(extraction.items[0].location().block, 1);
    assert_eq!(extraction.skipped.len(), 1);
    assert_eq!(extraction.skipped[0].location.line, 7);
    assert_eq!(extraction.skipped[0].expr, "<unresolved>");
}

#[test]
fn access_path_serializes_as_text() {
    let path = AccessPath::field("A", "items").then_element();
    assert_eq!(serde_json::to_string(&path).unwrap(), r#""A.items[*]""#);
}
