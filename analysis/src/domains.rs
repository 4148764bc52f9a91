use core::cmp::Ordering;
use core::fmt::Debug;
use core::ops::{Deref, DerefMut};

use fixedbitset::FixedBitSet;

/////////////////////////
// Traits for domains. //
/////////////////////////

/// A partially ordered set where any two elements have a least upper bound.
/// Larger elements are safer approximations of the program behavior, the
/// bottom element usually stands for unreachable code.
pub trait JoinSemiLattice: Eq + PartialOrd + Clone + Debug {
    /// Side information needed to build some of the elements, e.g. the size
    /// of the universe for set lattices. Set this to unit when not needed.
    type LatticeContext;

    /// The unit element of the join, the smallest element of the lattice.
    fn bottom(ctx: &Self::LatticeContext) -> Self;

    /// The least upper bound of two elements. Computes the state after merge
    /// points, where every predecessor needs to be approximated.
    ///
    /// Requirements:
    /// * Reflexive: a.join(a, ctx) == a
    /// * Commutative: a.join(b, ctx) == b.join(a, ctx)
    /// * Bottom is unit: bottom.join(b, ctx) == b
    /// * Upper bound: a.join(b, ctx) >= a and a.join(b, ctx) >= b
    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;
}

/// A join semi-lattice that also has a greatest lower bound for any two
/// elements.
pub trait Lattice: JoinSemiLattice {
    /// The unit element of the meet, the largest element of the lattice.
    fn top(ctx: &Self::LatticeContext) -> Self;

    /// The greatest lower bound of two elements.
    ///
    /// Requirements:
    /// * Reflexive: a.meet(a, ctx) == a
    /// * Commutative: a.meet(b, ctx) == b.meet(a, ctx)
    /// * Top is unit: top.meet(b, ctx) == b
    /// * Lower bound: a.meet(b, ctx) <= a and a.meet(b, ctx) <= b
    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self;
}

/////////////////////////////////////
// Concrete domain implementations //
/////////////////////////////////////

/// Power set lattice over the numbers `0..n`, where `n` is stored in the
/// context. Union is join, intersection is meet.
#[derive(PartialEq, Eq, Clone)]
pub struct BitSet(pub FixedBitSet);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitSetTop(pub usize);

impl Deref for BitSet {
    type Target = FixedBitSet;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BitSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl BitSet {
    pub fn from(ctx: &BitSetTop, values: &[usize]) -> Self {
        let mut inner = FixedBitSet::with_capacity(ctx.0);
        for &v in values {
            inner.insert(v);
        }
        Self(inner)
    }
}

impl PartialOrd for BitSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_superset(other), other.is_superset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl Debug for BitSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let elements: Vec<String> = self.ones().map(|x| x.to_string()).collect();
        write!(f, "{{{}}}", elements.join(", "))
    }
}

impl JoinSemiLattice for BitSet {
    type LatticeContext = BitSetTop;

    fn bottom(ctx: &Self::LatticeContext) -> Self {
        Self(FixedBitSet::with_capacity(ctx.0))
    }

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.clone();
        result.union_with(other);
        result
    }
}

impl Lattice for BitSet {
    fn top(ctx: &Self::LatticeContext) -> Self {
        let mut result = FixedBitSet::with_capacity(ctx.0);
        result.insert_range(..);
        Self(result)
    }

    fn meet(&self, other: &Self, _ctx: &Self::LatticeContext) -> Self {
        let mut result = self.clone();
        result.intersect_with(other);
        result
    }
}

/// The dual of a lattice: the order is reversed, join and meet swap roles.
/// Must analyses, that only keep facts holding on every incoming path, are
/// may analyses over the flipped lattice.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Flipped<T: Lattice>(pub T);

impl<T: Lattice> PartialOrd for Flipped<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0).map(Ordering::reverse)
    }
}

impl<T: Lattice> JoinSemiLattice for Flipped<T> {
    type LatticeContext = T::LatticeContext;

    fn bottom(ctx: &Self::LatticeContext) -> Self {
        Self(T::top(ctx))
    }

    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        Self(self.0.meet(&other.0, ctx))
    }
}

impl<T: Lattice> Lattice for Flipped<T> {
    fn top(ctx: &Self::LatticeContext) -> Self {
        Self(T::bottom(ctx))
    }

    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Self {
        Self(self.0.join(&other.0, ctx))
    }
}
