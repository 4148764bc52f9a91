use core::cmp::Ordering;
use core::fmt::Display;
use std::collections::{BTreeSet, HashMap, HashSet};

use analysis::{
    cfg::{CfgBlock, ControlFlowGraph, OpPos},
    domains::{BitSet, BitSetTop, Flipped},
    solvers::{SolveMonotone, SolverError, TransferFunction},
};
use itertools::Itertools;

use crate::access::{AccessPath, CallMarker, Extracted, Extraction, RawAccess, Resolution};
use crate::ir::{Cfg, LockExpr, MethodRecord, OpKind, Operation};

/// Canonical name of a lock object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockId {
    /// The receiver of the method. Paths are not tied to a receiver either,
    /// so an inherited method and an override lock the same object.
    This,
    /// A lock object stored in a field.
    Field(AccessPath),
    /// A lock shared by every instance of the class.
    Class(String),
}

impl LockId {
    /// Returns `None` for lock expressions that cannot be named statically,
    /// acquiring those never protects anything.
    pub fn canonicalize(expr: &LockExpr) -> Option<Self> {
        match expr {
            LockExpr::This => Some(LockId::This),
            LockExpr::Class { name } => Some(LockId::Class(name.clone())),
            LockExpr::Field { target } => match AccessPath::canonicalize(target) {
                Resolution::Path(path) => Some(LockId::Field(path)),
                Resolution::NotHeap | Resolution::Unresolved(_) => None,
            },
        }
    }
}

impl Display for LockId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LockId::This => write!(f, "this"),
            LockId::Field(path) => write!(f, "{path}"),
            LockId::Class(class) => write!(f, "{class}.class"),
        }
    }
}

/// Locks statically known to be held. Ordered by inclusion, the empty set
/// means no protection at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LockSet(BTreeSet<LockId>);

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lock: LockId) -> bool {
        self.0.insert(lock)
    }

    pub fn remove(&mut self, lock: &LockId) -> bool {
        self.0.remove(lock)
    }

    pub fn contains(&self, lock: &LockId) -> bool {
        self.0.contains(lock)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockId> {
        self.0.iter()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl PartialOrd for LockSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_subset(other), other.is_subset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl FromIterator<LockId> for LockSet {
    fn from_iter<T: IntoIterator<Item = LockId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for LockSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(", "))
    }
}

/// Dense numbering of the locks a single method mentions. The solver works
/// on bit sets over this table.
#[derive(Clone, Debug, Default)]
pub struct LockTable {
    locks: Vec<LockId>,
    index: HashMap<LockId, usize>,
    /// Acquire and release operations naming a known lock.
    op_locks: HashMap<OpPos, usize>,
    call_locks: HashMap<OpPos, Vec<LockId>>,
    entry: Vec<usize>,
}

impl LockTable {
    pub fn new(method: &MethodRecord) -> Self {
        let mut table = Self::default();

        if method.annotations.synchronized {
            let id = table.intern(LockId::This);
            table.entry.push(id);
        }
        if let Some(guard) = &method.annotations.guarded_by {
            if let Some(lock) = LockId::canonicalize(guard) {
                let id = table.intern(lock);
                table.entry.push(id);
            }
        }

        for (block_id, block) in method.cfg.blocks().iter().enumerate() {
            for (op_id, op) in block.operations().iter().enumerate() {
                let pos = OpPos { block_id, op_id };
                match &op.kind {
                    OpKind::Acquire { lock } | OpKind::Release { lock } => {
                        if let Some(lock) = LockId::canonicalize(lock) {
                            let id = table.intern(lock);
                            table.op_locks.insert(pos, id);
                        }
                    }
                    OpKind::Call { locks_held, .. } if !locks_held.is_empty() => {
                        let locks = locks_held
                            .iter()
                            .filter_map(LockId::canonicalize)
                            .collect();
                        table.call_locks.insert(pos, locks);
                    }
                    _ => {}
                }
            }
        }
        table
    }

    fn intern(&mut self, lock: LockId) -> usize {
        if let Some(&id) = self.index.get(&lock) {
            return id;
        }
        let id = self.locks.len();
        self.locks.push(lock.clone());
        self.index.insert(lock, id);
        id
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn ctx(&self) -> BitSetTop {
        BitSetTop(self.locks.len())
    }

    pub fn decode(&self, held: &BitSet) -> LockSet {
        held.ones().map(|id| self.locks[id].clone()).collect()
    }
}

/// Locks held on every path, intersection at merge points.
pub type HeldLocks = Flipped<BitSet>;

struct LockTransfer<'t> {
    table: &'t LockTable,
}

impl TransferFunction<Cfg, HeldLocks> for LockTransfer<'_> {
    fn operation(
        &mut self,
        pos: OpPos,
        op: &Operation,
        _cfg: &Cfg,
        _ctx: &BitSetTop,
        pre_state: &HeldLocks,
    ) -> HeldLocks {
        let Some(&lock) = self.table.op_locks.get(&pos) else {
            return pre_state.clone();
        };
        let mut post_state = pre_state.clone();
        match op.kind {
            OpKind::Acquire { .. } => post_state.0.insert(lock),
            OpKind::Release { .. } => post_state.0.set(lock, false),
            _ => {}
        }
        post_state
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedAccess {
    pub access: RawAccess,
    pub locks: LockSet,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedCall {
    pub call: CallMarker,
    pub locks: LockSet,
}

/// Accesses and call sites of a method, each with the locks held right
/// before it. Operations in blocks unreachable from the entry are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaggedMethod {
    pub accesses: Vec<TaggedAccess>,
    pub calls: Vec<TaggedCall>,
    /// Block visits the solver needed.
    pub steps: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockSetTracker {
    /// Maximum number of block visits, `None` for no limit.
    pub budget: Option<usize>,
}

impl LockSetTracker {
    pub fn track(
        &self,
        method: &MethodRecord,
        extraction: &Extraction,
    ) -> Result<TaggedMethod, SolverError> {
        let table = LockTable::new(method);
        let ctx = table.ctx();
        let seed = Flipped(BitSet::from(&ctx, &table.entry));
        let solver = SolveMonotone {
            step_limit: self.budget,
        };
        let mut transfer = LockTransfer { table: &table };
        let solution = solver.solve(&method.cfg, seed, &ctx, &mut transfer)?;

        let wanted: HashSet<OpPos> = extraction
            .items
            .iter()
            .map(|item| {
                let location = item.location();
                OpPos {
                    block_id: location.block,
                    op_id: location.op,
                }
            })
            .collect();
        let mut held_at = HashMap::new();
        solution.for_each_operation(&method.cfg, &ctx, &mut transfer, |pos, _op, state| {
            if wanted.contains(&pos) {
                held_at.insert(pos, table.decode(&state.0));
            }
        });

        let mut tagged = TaggedMethod {
            steps: solution.steps,
            ..TaggedMethod::default()
        };
        for item in &extraction.items {
            let location = item.location();
            let pos = OpPos {
                block_id: location.block,
                op_id: location.op,
            };
            let Some(held) = held_at.get(&pos) else {
                continue;
            };
            match item {
                Extracted::Access(access) => tagged.accesses.push(TaggedAccess {
                    access: access.clone(),
                    locks: held.clone(),
                }),
                Extracted::Call(call) => {
                    let mut locks = held.clone();
                    for lock in table.call_locks.get(&pos).into_iter().flatten() {
                        locks.insert(lock.clone());
                    }
                    tagged.calls.push(TaggedCall {
                        call: call.clone(),
                        locks,
                    });
                }
            }
        }
        Ok(tagged)
    }

    /// Fallback when the budget runs out: nothing is considered protected.
    pub fn untracked(extraction: &Extraction) -> TaggedMethod {
        let mut tagged = TaggedMethod::default();
        for item in &extraction.items {
            match item {
                Extracted::Access(access) => tagged.accesses.push(TaggedAccess {
                    access: access.clone(),
                    locks: LockSet::new(),
                }),
                Extracted::Call(call) => tagged.calls.push(TaggedCall {
                    call: call.clone(),
                    locks: LockSet::new(),
                }),
            }
        }
        tagged
    }
}

#[cfg(test)]
mod lockset_tests;
