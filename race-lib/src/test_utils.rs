use crate::ir::{
    AccessExpr, Cfg, ClassAnnotations, ClassRecord, LockExpr, MethodAnnotations, MethodId,
    MethodRecord, OpKind, Operation, Program,
};

pub fn read(class: &str, field: &str) -> OpKind {
    OpKind::Read {
        target: AccessExpr::this_field(class, field),
    }
}

pub fn write(class: &str, field: &str) -> OpKind {
    OpKind::Write {
        target: AccessExpr::this_field(class, field),
    }
}

pub fn field_lock(class: &str, field: &str) -> LockExpr {
    LockExpr::Field {
        target: AccessExpr::this_field(class, field),
    }
}

pub fn acquire(lock: LockExpr) -> OpKind {
    OpKind::Acquire { lock }
}

pub fn release(lock: LockExpr) -> OpKind {
    OpKind::Release { lock }
}

pub fn call(callee: MethodId) -> OpKind {
    OpKind::Call {
        callee,
        locks_held: Vec::new(),
    }
}

/// A single block holding the operations, numbered as lines `1..`.
pub fn straight_line(ops: Vec<OpKind>) -> Cfg {
    let mut cfg = Cfg::new();
    let entry = cfg.new_block();
    for (line, kind) in (1..).zip(ops) {
        cfg.push_op(entry, Operation::new(line, kind));
    }
    cfg
}

pub fn method(id: u32, class: &str, name: &str, cfg: Cfg) -> MethodRecord {
    MethodRecord {
        id: MethodId(id),
        name: name.to_owned(),
        declaring_class: class.to_owned(),
        cfg,
        annotations: MethodAnnotations::default(),
    }
}

/// Builds programs for tests. Method ids are handed out in insertion order
/// starting from zero, so tests can refer to methods added later.
#[derive(Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(
        &mut self,
        name: &str,
        superclasses: &[&str],
        annotations: ClassAnnotations,
    ) -> &mut Self {
        self.program.classes.push(ClassRecord {
            name: name.to_owned(),
            superclasses: superclasses.iter().map(|&s| s.to_owned()).collect(),
            annotations,
        });
        self
    }

    pub fn thread_safe_class(&mut self, name: &str) -> &mut Self {
        self.class(
            name,
            &[],
            ClassAnnotations {
                thread_safe: true,
                ..ClassAnnotations::default()
            },
        )
    }

    pub fn method(&mut self, class: &str, name: &str, ops: Vec<OpKind>) -> MethodId {
        self.method_with(class, name, MethodAnnotations::default(), straight_line(ops))
    }

    pub fn method_with(
        &mut self,
        class: &str,
        name: &str,
        annotations: MethodAnnotations,
        cfg: Cfg,
    ) -> MethodId {
        let id = MethodId(self.program.methods.len() as u32);
        let mut record = method(id.0, class, name, cfg);
        record.annotations = annotations;
        self.program.methods.push(record);
        id
    }

    pub fn next_id(&self) -> MethodId {
        MethodId(self.program.methods.len() as u32)
    }

    pub fn build(&self) -> Program {
        self.program.clone()
    }
}
