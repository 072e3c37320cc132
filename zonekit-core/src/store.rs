//! Shared storage for DBM matrices.
//!
//! A matrix lives behind an [`Rc`] handle; copies of a [`Dbm`](crate::dbm::Dbm)
//! share the allocation until one of them mutates, at which point
//! [`Shared::make_mut`] clones. The handle also carries the lazily computed
//! minimal graph of its matrix, dropped on every mutation.
//!
//! A thread-local interning table maps matrix hashes to live handles so
//! that structurally equal DBMs can share storage across federations. The
//! table holds weak references, is only populated through [`intern`], and
//! is dropped by [`cleanup`]. The library is single-threaded by design;
//! `Rc` makes that explicit.

use crate::bound::Bound;
use crate::common::MAX_DIM;
use crate::mingraph::BitMatrix;
use std::cell::RefCell;
use std::collections::hash_map::{DefaultHasher, Entry, HashMap};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Reference-counted payload of a non-empty DBM: dimension, matrix and
/// cached minimal graph.
#[derive(Debug)]
pub(crate) struct Shared {
    dim: usize,
    cells: Box<[Bound]>,
    mingraph: RefCell<Option<(BitMatrix, usize)>>,
}

impl Clone for Shared {
    fn clone(&self) -> Self {
        Self {
            dim: self.dim,
            cells: self.cells.clone(),
            mingraph: RefCell::new(self.mingraph.borrow().clone()),
        }
    }
}

impl PartialEq for Shared {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim && self.cells == other.cells
    }
}

impl Eq for Shared {}

impl Shared {
    pub(crate) fn new(dim: usize, cells: Box<[Bound]>) -> Rc<Self> {
        assert!(dim >= 1 && dim <= MAX_DIM, "dimension out of range: {dim}");
        debug_assert_eq!(cells.len(), dim * dim);
        Rc::new(Self {
            dim,
            cells,
            mingraph: RefCell::new(None),
        })
    }

    pub(crate) const fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn cells(&self) -> &[Bound] {
        &self.cells
    }

    /// Unique access to the matrix for mutation: clones when shared and
    /// always drops the minimal-graph cache.
    pub(crate) fn make_mut(this: &mut Rc<Self>) -> &mut [Bound] {
        let shared = Rc::make_mut(this);
        *shared.mingraph.get_mut() = None;
        &mut shared.cells
    }

    /// The cached minimal graph, computing it on first use.
    pub(crate) fn mingraph_with(
        &self,
        compute: impl FnOnce(&[Bound], usize) -> (BitMatrix, usize),
    ) -> (BitMatrix, usize) {
        let mut cache = self.mingraph.borrow_mut();
        if cache.is_none() {
            *cache = Some(compute(&self.cells, self.dim));
        }
        cache.clone().unwrap()
    }

    pub(crate) fn cached_mingraph(&self) -> Option<(BitMatrix, usize)> {
        self.mingraph.borrow().clone()
    }

    fn adopt_mingraph(&self, graph: (BitMatrix, usize)) {
        let mut cache = self.mingraph.borrow_mut();
        if cache.is_none() {
            *cache = Some(graph);
        }
    }

    pub(crate) fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.dim.hash(&mut hasher);
        for b in self.cells.iter() {
            b.hash(&mut hasher);
        }
        hasher.finish()
    }
}

thread_local! {
    static TABLE: RefCell<HashMap<u64, Vec<Weak<Shared>>>> = RefCell::new(HashMap::new());
}

/// Replace `handle` with an equal, already-interned handle when one exists;
/// otherwise insert it. A minimal-graph cache present on either side
/// migrates to the surviving handle.
pub(crate) fn intern(handle: &mut Rc<Shared>) {
    TABLE.with(|table| {
        let mut table = table.borrow_mut();
        match table.entry(handle.hash_value()) {
            Entry::Occupied(mut entry) => {
                let bucket = entry.get_mut();
                bucket.retain(|weak| weak.strong_count() > 0);
                for weak in bucket.iter() {
                    if let Some(existing) = weak.upgrade() {
                        if existing == *handle {
                            if Rc::ptr_eq(&existing, handle) {
                                return;
                            }
                            if let Some(graph) = handle.cached_mingraph() {
                                existing.adopt_mingraph(graph);
                            }
                            *handle = existing;
                            return;
                        }
                    }
                }
                bucket.push(Rc::downgrade(handle));
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![Rc::downgrade(handle)]);
            }
        }
    });
}

/// Drop the interning table. Outstanding handles stay valid; they are just
/// no longer found by [`intern`].
pub fn cleanup() {
    TABLE.with(|table| table.borrow_mut().clear());
}
