//! Register addressing.
//!
//! A register is a column slot of an item block. Register sets are small and
//! ordered so copying kept registers walks them in a stable order.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterId(u32);

impl RegisterId {
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for RegisterId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterSet(BTreeSet<RegisterId>);

impl RegisterSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Registers `0..n`.
    pub fn first(n: u32) -> Self {
        (0..n).map(RegisterId::new).collect()
    }

    pub fn insert(&mut self, reg: RegisterId) -> bool {
        self.0.insert(reg)
    }

    pub fn contains(&self, reg: RegisterId) -> bool {
        self.0.contains(&reg)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RegisterId> + '_ {
        self.0.iter().copied()
    }

    /// Largest register index plus one, i.e. the width a block needs.
    pub fn width(&self) -> usize {
        self.0.iter().next_back().map(|r| r.index() + 1).unwrap_or(0)
    }
}

impl FromIterator<RegisterId> for RegisterSet {
    fn from_iter<I: IntoIterator<Item = RegisterId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[u32; N]> for RegisterSet {
    fn from(regs: [u32; N]) -> Self {
        regs.into_iter().map(RegisterId::new).collect()
    }
}
