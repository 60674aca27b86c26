// Copyright © 2024 Pathway

//! Partitioned graph storage as seen by the superstep engine.
//!
//! A worker owns one [`Fragment`]: a disjoint set of *inner* vertices plus
//! the *outer* (ghost) vertices its edges point at. Vertices are addressed
//! by a process-local dense [`Vertex`] index, by a [`Gid`] that encodes the
//! owning fragment, or by the external [`Oid`] the input used. The engine
//! never mutates a fragment.

use std::fmt::{self, Display};
use std::iter::FusedIterator;
use std::ops::Range;

use serde::{Deserialize, Serialize};

pub mod edge_cut;
pub mod shard;

pub use edge_cut::{EdgeCutFragment, GraphBuilder};
pub use shard::{ModuloPartitioner, Partitioner, Shard};

pub type Fid = usize;
pub type Oid = u64;
pub type LabelId = usize;
pub type Weight = f64;

const FID_SHIFT: u32 = 48;
const OFFSET_MASK: u64 = (1 << FID_SHIFT) - 1;

/// Largest number of fragments a [`Gid`] can address.
pub const MAX_FRAGMENTS: usize = 1 << (u64::BITS - FID_SHIFT);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Vertex(pub usize);

impl Vertex {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Global vertex id: owning fragment in the high bits, offset within the
/// owner's inner vertices in the low bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Gid(pub u64);

impl Gid {
    pub fn new(fid: Fid, offset: usize) -> Self {
        debug_assert!(fid < MAX_FRAGMENTS);
        debug_assert!(offset as u64 <= OFFSET_MASK);
        Self(((fid as u64) << FID_SHIFT) | (offset as u64 & OFFSET_MASK))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn fid(self) -> Fid {
        (self.0 >> FID_SHIFT) as Fid
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn offset(self) -> usize {
        (self.0 & OFFSET_MASK) as usize
    }
}

impl Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.fid(), self.offset())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub neighbor: Vertex,
    pub weight: Weight,
    pub label: LabelId,
}

/// Contiguous range of local vertices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexRange(Range<usize>);

impl VertexRange {
    pub fn new(range: Range<usize>) -> Self {
        Self(range)
    }

    pub fn contains(&self, v: Vertex) -> bool {
        self.0.contains(&v.index())
    }

    pub fn as_range(&self) -> Range<usize> {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Iterator for VertexRange {
    type Item = Vertex;

    fn next(&mut self) -> Option<Vertex> {
        self.0.next().map(Vertex)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl DoubleEndedIterator for VertexRange {
    fn next_back(&mut self) -> Option<Vertex> {
        self.0.next_back().map(Vertex)
    }
}

impl ExactSizeIterator for VertexRange {}
impl FusedIterator for VertexRange {}

/// Read-only partition interface consumed by the engine.
///
/// Inner vertices occupy the local indices `0..inner_vertices_num()` and are
/// ordered by label, outer vertices follow them.
pub trait Fragment: Send + Sync {
    fn fid(&self) -> Fid;

    fn fnum(&self) -> usize;

    fn inner_vertices_num(&self) -> usize;

    fn outer_vertices_num(&self) -> usize;

    fn total_vertices_num(&self) -> usize;

    fn vertex_label_num(&self) -> usize {
        1
    }

    fn inner_vertices_of_label(&self, label: LabelId) -> VertexRange;

    fn vertex_label(&self, v: Vertex) -> LabelId;

    fn outgoing_edges(&self, v: Vertex) -> &[Edge];

    fn incoming_edges(&self, v: Vertex) -> &[Edge];

    fn vertex_to_gid(&self, v: Vertex) -> Gid;

    fn gid_to_vertex(&self, gid: Gid) -> Option<Vertex>;

    fn vertex_to_oid(&self, v: Vertex) -> Oid;

    fn oid_to_vertex(&self, oid: Oid) -> Option<Vertex>;

    fn inner_vertices(&self) -> VertexRange {
        VertexRange::new(0..self.inner_vertices_num())
    }

    fn outer_vertices(&self) -> VertexRange {
        let inner = self.inner_vertices_num();
        VertexRange::new(inner..inner + self.outer_vertices_num())
    }

    fn local_vertices_num(&self) -> usize {
        self.inner_vertices_num() + self.outer_vertices_num()
    }

    fn is_inner_vertex(&self, v: Vertex) -> bool {
        v.index() < self.inner_vertices_num()
    }

    fn is_outer_vertex(&self, v: Vertex) -> bool {
        self.outer_vertices().contains(v)
    }
}
