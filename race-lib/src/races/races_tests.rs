use pretty_assertions::assert_eq;

use super::*;
use crate::ir::{ClassRecord, MethodAnnotations};
use crate::lockset::LockId;
use crate::test_utils::{method, straight_line};

use ThreadContext::*;

fn event(
    owner: u32,
    line: u32,
    kind: AccessKind,
    thread: ThreadContext,
    locks: &[LockId],
) -> AccessEvent {
    AccessEvent {
        path: AccessPath::field("A", "f"),
        kind,
        locks: locks.iter().cloned().collect(),
        location: Location {
            method: MethodId(owner),
            line,
            block: 0,
            op: line as usize,
        },
        thread,
        owner: MethodId(owner),
        via: None,
    }
}

fn lock(name: &str) -> LockId {
    LockId::Field(AccessPath::field("A", name))
}

#[test]
fn conflict_rules() {
    use AccessKind::*;
    let w = event(0, 1, Write, BackgroundReachable, &[]);
    let r = event(1, 2, Read, BackgroundReachable, &[]);
    assert!(conflicts(&w, &r, false));
    assert!(conflicts(&w, &w, true));
    assert!(!conflicts(&r, &r, false));

    let guarded_w = event(0, 1, Write, BackgroundReachable, &[lock("l")]);
    let guarded_r = event(1, 2, Read, BackgroundReachable, &[lock("l"), lock("m")]);
    let other_r = event(1, 2, Read, BackgroundReachable, &[lock("m")]);
    assert!(!conflicts(&guarded_w, &guarded_r, false));
    assert!(conflicts(&guarded_w, &other_r, false));

    let main = event(2, 3, Write, MainThreadOnly, &[]);
    let unknown = event(3, 4, Write, UnknownThread, &[]);
    assert!(!conflicts(&main, &unknown, false));
    assert!(conflicts(&main, &w, true));
    assert!(conflicts(&unknown, &unknown, false));
    assert!(!conflicts(&unknown, &unknown, true));
}

fn summary(method: u32, accesses: Vec<AccessEvent>) -> Arc<MethodSummary> {
    Arc::new(MethodSummary {
        method: MethodId(method),
        accesses,
        thread_context: BackgroundReachable,
        degraded: false,
    })
}

struct Fixture {
    classes: Vec<ClassRecord>,
    methods: Vec<MethodRecord>,
    summaries: HashMap<MethodId, Arc<MethodSummary>>,
}

impl Fixture {
    /// Class `A` with `get` and `put`, a private helper and a constructor.
    fn new() -> Self {
        let mut methods: Vec<MethodRecord> = ["get", "put", "helper", "init"]
            .iter()
            .enumerate()
            .map(|(id, name)| method(id as u32, "A", name, straight_line(Vec::new())))
            .collect();
        methods[2].annotations = MethodAnnotations {
            private: true,
            ..MethodAnnotations::default()
        };
        methods[3].annotations = MethodAnnotations {
            constructor: true,
            ..MethodAnnotations::default()
        };
        let summaries = [
            summary(0, vec![event(0, 1, AccessKind::Read, UnknownThread, &[])]),
            summary(1, vec![event(1, 2, AccessKind::Write, BackgroundReachable, &[])]),
            summary(2, vec![event(2, 3, AccessKind::Write, BackgroundReachable, &[])]),
            summary(3, vec![event(3, 4, AccessKind::Write, BackgroundReachable, &[])]),
        ]
        .into_iter()
        .map(|s| (s.method, s))
        .collect();
        Self {
            classes: Vec::new(),
            methods,
            summaries,
        }
    }

    fn collect(&self, min_confidence: Confidence) -> Vec<Finding> {
        let hierarchy = ClassHierarchy::new(&self.classes, &self.methods);
        let collector = RaceCollector::new(&hierarchy, false, min_confidence);
        collector.collect(|id| self.summaries.get(&id).cloned())
    }
}

#[test]
fn roots_pair_up() {
    let findings = Fixture::new().collect(Confidence::Low);
    let pairs: Vec<_> = findings
        .iter()
        .map(|f| (f.method_a, f.method_b, f.kind_a, f.kind_b, f.confidence))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (
                MethodId(0),
                MethodId(1),
                AccessKind::Read,
                AccessKind::Write,
                Confidence::Low
            ),
            (
                MethodId(1),
                MethodId(1),
                AccessKind::Write,
                AccessKind::Write,
                Confidence::High
            ),
        ]
    );
    assert_eq!(
        findings[0].message,
        "Read/Write race on `A.f`: `A.get` reads it on line 1, `A.put` writes it on line 2"
    );
    assert_eq!(
        findings[1].to_string(),
        "A: Unprotected write on `A.f`: `A.put` writes it on line 2, `A.put` writes it on line 2 (high confidence)"
    );
}

#[test]
fn low_confidence_can_be_filtered() {
    let findings = Fixture::new().collect(Confidence::High);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].confidence, Confidence::High);
}

#[test]
fn duplicates_prefer_write_write_pairs() {
    let mut fixture = Fixture::new();
    let get = summary(
        0,
        vec![
            event(0, 1, AccessKind::Read, BackgroundReachable, &[lock("l")]),
            event(0, 5, AccessKind::Write, BackgroundReachable, &[lock("m")]),
        ],
    );
    fixture.summaries.insert(MethodId(0), get);
    let findings = fixture.collect(Confidence::Low);

    let between: Vec<_> = findings
        .iter()
        .filter(|f| f.method_a != f.method_b)
        .collect();
    assert_eq!(between.len(), 1);
    assert_eq!(
        (between[0].kind_a, between[0].kind_b),
        (AccessKind::Write, AccessKind::Write)
    );
    assert_eq!(between[0].location_a.line, 5);
    assert_eq!(between[0].location_b.line, 2);
    assert_eq!(
        between[0].message,
        "Unprotected write on `A.f`: `A.get` writes it on line 5 holding {A.m}, \
         `A.put` writes it on line 2"
    );
}

#[test]
fn inherited_pairs_are_reported_once() {
    let mut fixture = Fixture::new();
    fixture.classes = vec![ClassRecord {
        name: "B".to_owned(),
        superclasses: vec!["A".to_owned()],
        annotations: Default::default(),
    }];
    let findings = fixture.collect(Confidence::Low);
    assert_eq!(findings.len(), 2);
    assert!(findings.iter().all(|f| f.class == "A"));
}
