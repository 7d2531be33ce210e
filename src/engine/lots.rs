//! Shared lot storage and quantity tolerance.
//!
//! Both matching engines keep their acquisition records in an [`Arena`] owned by
//! a single engine instance. Records are referenced by [`LotId`] from queues and
//! day buckets, so consuming a record through one index is visible through every
//! other index that refers to it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::ops::{Index, IndexMut};

/// Quantities at or below this are treated as exhausted.
pub const EPSILON: Decimal = dec!(0.000000000001);

/// True once a remaining quantity has fallen within tolerance of zero.
pub fn is_exhausted(quantity: Decimal) -> bool {
    quantity <= EPSILON
}

/// Take up to `wanted` from `available`, returning the amount taken.
pub fn take_from(available: &mut Decimal, wanted: Decimal) -> Decimal {
    let take = wanted.min(*available).max(Decimal::ZERO);
    *available -= take;
    take
}

/// Index of a record inside an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LotId(usize);

/// Append-only indexed storage for lots and acquisition records
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { items: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) -> LotId {
        self.items.push(item);
        LotId(self.items.len() - 1)
    }

    /// First index for which `pred` is false, assuming the arena is partitioned by it.
    pub fn partition_point<P>(&self, pred: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        self.items.partition_point(pred)
    }

    /// Ids of every record from `start` to the end, in insertion order.
    pub fn ids_from(&self, start: usize) -> impl Iterator<Item = LotId> {
        (start.min(self.items.len())..self.items.len()).map(LotId)
    }
}

impl<T> Index<LotId> for Arena<T> {
    type Output = T;

    fn index(&self, id: LotId) -> &T {
        &self.items[id.0]
    }
}

impl<T> IndexMut<LotId> for Arena<T> {
    fn index_mut(&mut self, id: LotId) -> &mut T {
        &mut self.items[id.0]
    }
}
