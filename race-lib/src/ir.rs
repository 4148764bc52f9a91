use core::fmt::Display;

use analysis::cfg::{CfgBlock, ControlFlowGraph};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Stable identifier of a method, assigned by the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(pub u32);

impl Display for MethodId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The object an access starts from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Base {
    This,
    Local { name: String },
    Static { class: String },
    /// Reflection and other expressions the front-end could not resolve.
    Unresolved,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Selector {
    /// A field together with the class declaring it.
    Field { class: String, name: String },
    /// An element of an array or a keyed collection.
    Element,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessExpr {
    pub base: Base,
    #[serde(default)]
    pub selectors: Vec<Selector>,
}

impl AccessExpr {
    pub fn this_field(class: &str, name: &str) -> Self {
        Self {
            base: Base::This,
            selectors: vec![Selector::Field {
                class: class.to_owned(),
                name: name.to_owned(),
            }],
        }
    }

    pub fn local_field(local: &str, class: &str, name: &str) -> Self {
        Self {
            base: Base::Local {
                name: local.to_owned(),
            },
            selectors: vec![Selector::Field {
                class: class.to_owned(),
                name: name.to_owned(),
            }],
        }
    }

    pub fn field(mut self, class: &str, name: &str) -> Self {
        self.selectors.push(Selector::Field {
            class: class.to_owned(),
            name: name.to_owned(),
        });
        self
    }

    pub fn element(mut self) -> Self {
        self.selectors.push(Selector::Element);
        self
    }
}

impl Display for AccessExpr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.base {
            Base::This => write!(f, "this")?,
            Base::Local { name } => write!(f, "{name}")?,
            Base::Static { class } => write!(f, "{class}")?,
            Base::Unresolved => write!(f, "<unresolved>")?,
        }
        for selector in &self.selectors {
            match selector {
                Selector::Field { name, .. } => write!(f, ".{name}")?,
                Selector::Element => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

/// The object guarding a critical section.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LockExpr {
    This,
    Field { target: AccessExpr },
    Class { name: String },
}

impl Display for LockExpr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LockExpr::This => write!(f, "this"),
            LockExpr::Field { target } => write!(f, "{target}"),
            LockExpr::Class { name } => write!(f, "{name}.class"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OpKind {
    Read {
        target: AccessExpr,
    },
    Write {
        target: AccessExpr,
    },
    Acquire {
        lock: LockExpr,
    },
    Release {
        lock: LockExpr,
    },
    #[serde(rename_all = "camelCase")]
    Call {
        callee: MethodId,
        /// Locks the front-end knows to be held for the duration of the call.
        #[serde(default)]
        locks_held: Vec<LockExpr>,
    },
    Nop,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Source line, only used for reporting.
    #[serde(default)]
    pub line: u32,
    #[serde(flatten)]
    pub kind: OpKind,
}

impl Operation {
    pub fn new(line: u32, kind: OpKind) -> Self {
        Self { line, kind }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            OpKind::Read { target } => write!(f, "read {target};"),
            OpKind::Write { target } => write!(f, "write {target};"),
            OpKind::Acquire { lock } => write!(f, "acquire {lock};"),
            OpKind::Release { lock } => write!(f, "release {lock};"),
            OpKind::Call { callee, locks_held } if locks_held.is_empty() => {
                write!(f, "call {callee};")
            }
            OpKind::Call { callee, locks_held } => {
                write!(f, "call {callee} holding {};", locks_held.iter().join(", "))
            }
            OpKind::Nop => write!(f, "nop;"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    #[serde(default)]
    operations: Vec<Operation>,
    #[serde(default)]
    successors: Vec<usize>,
    #[serde(skip)]
    predecessors: Vec<usize>,
}

impl CfgBlock for BasicBlock {
    type Operation = Operation;

    fn operations(&self) -> &[Self::Operation] {
        &self.operations
    }

    fn successors(&self) -> &[usize] {
        &self.successors
    }

    fn predecessors(&self) -> &[usize] {
        &self.predecessors
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CfgRecord {
    blocks: Vec<BasicBlock>,
}

/// Control flow graph of one method as produced by the front-end. The first
/// block is the entry. Predecessors are derived from the successor lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CfgRecord", into = "CfgRecord")]
pub struct Cfg {
    basic_blocks: Vec<BasicBlock>,
}

impl From<CfgRecord> for Cfg {
    fn from(record: CfgRecord) -> Self {
        let mut basic_blocks = record.blocks;
        // Edges to missing blocks are kept as successors only, validation
        // rejects the method later.
        let edges: Vec<_> = basic_blocks
            .iter()
            .enumerate()
            .flat_map(|(from, block)| block.successors.iter().map(move |&to| (from, to)))
            .collect();
        for block in &mut basic_blocks {
            block.predecessors.clear();
        }
        for (from, to) in edges {
            if let Some(target) = basic_blocks.get_mut(to) {
                target.predecessors.push(from);
            }
        }
        Self { basic_blocks }
    }
}

impl From<Cfg> for CfgRecord {
    fn from(cfg: Cfg) -> Self {
        Self {
            blocks: cfg.basic_blocks,
        }
    }
}

impl ControlFlowGraph for Cfg {
    type Block = BasicBlock;

    fn blocks(&self) -> &[Self::Block] {
        &self.basic_blocks
    }
}

impl Cfg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_block(&mut self) -> usize {
        self.basic_blocks.push(BasicBlock::default());
        self.basic_blocks.len() - 1
    }

    pub fn push_op(&mut self, block: usize, op: Operation) -> &mut Self {
        self.basic_blocks[block].operations.push(op);
        self
    }

    pub fn add_edge(&mut self, from: usize, to: usize) -> &mut Self {
        self.basic_blocks[from].successors.push(to);
        if let Some(target) = self.basic_blocks.get_mut(to) {
            target.predecessors.push(from);
        }
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MethodAnnotations {
    pub thread_safe: bool,
    pub thread_confined: bool,
    /// Lock every caller holds when entering the method.
    pub guarded_by: Option<LockExpr>,
    /// The whole body runs holding the receiver's monitor.
    pub synchronized: bool,
    pub private: bool,
    pub constructor: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRecord {
    pub id: MethodId,
    pub name: String,
    pub declaring_class: String,
    pub cfg: Cfg,
    #[serde(default)]
    pub annotations: MethodAnnotations,
}

impl MethodRecord {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_class, self.name)
    }

    /// Methods whose accesses only reach reports through their callers.
    pub fn is_reporting_root(&self) -> bool {
        !self.annotations.private && !self.annotations.constructor
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassAnnotations {
    pub thread_safe: bool,
    pub thread_confined: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    #[serde(default)]
    pub superclasses: Vec<String>,
    #[serde(default)]
    pub annotations: ClassAnnotations,
}

/// Everything the front-end hands over for one analysis run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
}

/// Render the control flow graph of a method in graphviz format.
pub fn print_cfg(method: &MethodRecord) -> String {
    let name = format!("\"{}\"", method.qualified_name());
    analysis::cfg::print(Some(&name), &method.cfg, |op| op.to_string())
}
