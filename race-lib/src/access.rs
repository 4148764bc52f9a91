use core::fmt::Display;

use analysis::cfg::{CfgBlock, ControlFlowGraph};
use serde::Serialize;

use crate::ir::{AccessExpr, Base, MethodId, MethodRecord, OpKind, Selector};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Field(String),
    /// Every element of a collection or array stored in the preceding field.
    Element,
}

/// Canonical name of a field or field chain. The root is the class declaring
/// the first field, so accesses through `this` and through any other
/// reference to the same declared field coincide.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct AccessPath {
    class: String,
    segments: Vec<Segment>,
}

/// Result of canonicalizing an access expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Path(AccessPath),
    /// Locals and bare receivers, not a heap access.
    NotHeap,
    Unresolved(&'static str),
}

impl AccessPath {
    pub fn field(class: &str, name: &str) -> Self {
        Self {
            class: class.to_owned(),
            segments: vec![Segment::Field(name.to_owned())],
        }
    }

    pub fn then_field(mut self, name: &str) -> Self {
        self.segments.push(Segment::Field(name.to_owned()));
        self
    }

    pub fn then_element(mut self) -> Self {
        self.segments.push(Segment::Element);
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn canonicalize(expr: &AccessExpr) -> Resolution {
        if expr.base == Base::Unresolved {
            return Resolution::Unresolved("receiver is not statically known");
        }
        let mut selectors = expr.selectors.iter();
        let mut path = match selectors.next() {
            None => return Resolution::NotHeap,
            Some(Selector::Element) => {
                return Resolution::Unresolved("container is not held in a declared field");
            }
            Some(Selector::Field { class, name }) => Self::field(class, name),
        };
        for selector in selectors {
            match selector {
                Selector::Field { name, .. } => path.segments.push(Segment::Field(name.clone())),
                Selector::Element => {
                    path.segments.push(Segment::Element);
                    break;
                }
            }
        }
        Resolution::Path(path)
    }
}

impl Display for AccessPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.class)?;
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Element => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

impl From<AccessPath> for String {
    fn from(path: AccessPath) -> Self {
        path.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn is_write(self) -> bool {
        self == AccessKind::Write
    }
}

impl Display for AccessKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// Where an access happens. `block` and `op` identify the operation inside
/// the method, `line` is the source line reported to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Location {
    pub method: MethodId,
    pub line: u32,
    pub block: usize,
    pub op: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAccess {
    pub path: AccessPath,
    pub kind: AccessKind,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallMarker {
    pub callee: MethodId,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extracted {
    Access(RawAccess),
    Call(CallMarker),
}

impl Extracted {
    pub fn location(&self) -> Location {
        match self {
            Extracted::Access(access) => access.location,
            Extracted::Call(call) => call.location,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedAccess {
    pub location: Location,
    pub expr: String,
    pub reason: &'static str,
}

/// Accesses and call sites of one method in program order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub items: Vec<Extracted>,
    pub skipped: Vec<SkippedAccess>,
}

pub fn extract(method: &MethodRecord) -> Extraction {
    let mut extraction = Extraction::default();
    for (block_id, block) in method.cfg.blocks().iter().enumerate() {
        for (op_id, op) in block.operations().iter().enumerate() {
            let location = Location {
                method: method.id,
                line: op.line,
                block: block_id,
                op: op_id,
            };
            let (target, kind) = match &op.kind {
                OpKind::Read { target } => (target, AccessKind::Read),
                OpKind::Write { target } => (target, AccessKind::Write),
                OpKind::Call { callee, .. } => {
                    extraction.items.push(Extracted::Call(CallMarker {
                        callee: *callee,
                        location,
                    }));
                    continue;
                }
                OpKind::Acquire { .. } | OpKind::Release { .. } | OpKind::Nop => continue,
            };
            match AccessPath::canonicalize(target) {
                Resolution::Path(path) => {
                    extraction.items.push(Extracted::Access(RawAccess {
                        path,
                        kind,
                        location,
                    }));
                }
                Resolution::NotHeap => {}
                Resolution::Unresolved(reason) => {
                    tracing::debug!(
                        method = %method.qualified_name(),
                        line = op.line,
                        "skipping access {target}: {reason}"
                    );
                    extraction.skipped.push(SkippedAccess {
                        location,
                        expr: target.to_string(),
                        reason,
                    });
                }
            }
        }
    }
    extraction
}

#[cfg(test)]
mod access_tests;
