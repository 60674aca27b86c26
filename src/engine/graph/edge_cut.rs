// Copyright © 2024 Pathway

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use log::debug;

use super::shard::{ModuloPartitioner, Partitioner};
use super::{
    Edge, Fid, Fragment, Gid, LabelId, Oid, Vertex, VertexRange, Weight, MAX_FRAGMENTS,
};
use crate::engine::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct RawEdge {
    src: Oid,
    dst: Oid,
    weight: Weight,
    label: LabelId,
}

#[derive(Debug, Clone, Copy)]
struct VertexEntry {
    label: LabelId,
    explicit: bool,
}

/// Collects a labeled graph and splits it into edge-cut fragments.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    undirected: bool,
    vertices: BTreeMap<Oid, VertexEntry>,
    edges: Vec<RawEdge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every edge is stored in both directions.
    #[must_use]
    pub fn undirected(mut self) -> Self {
        self.undirected = true;
        self
    }

    pub fn add_vertex(&mut self, oid: Oid) -> Result<()> {
        self.add_labeled_vertex(oid, 0)
    }

    pub fn add_labeled_vertex(&mut self, oid: Oid, label: LabelId) -> Result<()> {
        match self.vertices.entry(oid) {
            Entry::Vacant(entry) => {
                entry.insert(VertexEntry {
                    label,
                    explicit: true,
                });
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.explicit && existing.label != label {
                    return Err(Error::DuplicateVertex(oid));
                }
                existing.label = label;
                existing.explicit = true;
            }
        }
        Ok(())
    }

    pub fn add_edge(&mut self, src: Oid, dst: Oid, weight: Weight) {
        self.add_labeled_edge(src, dst, weight, 0);
    }

    pub fn add_labeled_edge(&mut self, src: Oid, dst: Oid, weight: Weight, label: LabelId) {
        for oid in [src, dst] {
            self.vertices.entry(oid).or_insert(VertexEntry {
                label: 0,
                explicit: false,
            });
        }
        self.edges.push(RawEdge {
            src,
            dst,
            weight,
            label,
        });
    }

    pub fn vertices_num(&self) -> usize {
        self.vertices.len()
    }

    pub fn build(&self, fnum: usize) -> Result<Vec<EdgeCutFragment>> {
        if fnum == 0 || fnum > MAX_FRAGMENTS {
            return Err(Error::InvalidFragment(fnum));
        }
        self.build_with(&ModuloPartitioner::new(fnum))
    }

    pub fn build_with(&self, partitioner: &dyn Partitioner) -> Result<Vec<EdgeCutFragment>> {
        let fnum = partitioner.fnum();
        if fnum == 0 || fnum > MAX_FRAGMENTS {
            return Err(Error::InvalidFragment(fnum));
        }
        let label_num = self
            .vertices
            .values()
            .map(|entry| entry.label + 1)
            .max()
            .unwrap_or(1);

        let mut owned: Vec<Vec<(LabelId, Oid)>> = vec![Vec::new(); fnum];
        for (oid, entry) in &self.vertices {
            let fid = partitioner.fragment_of(*oid);
            if fid >= fnum {
                return Err(Error::InvalidFragment(fid));
            }
            owned[fid].push((entry.label, *oid));
        }
        for inner in &mut owned {
            inner.sort_unstable();
        }

        let mut gids: HashMap<Oid, Gid> = HashMap::with_capacity(self.vertices.len());
        for (fid, inner) in owned.iter().enumerate() {
            for (offset, (_label, oid)) in inner.iter().enumerate() {
                gids.insert(*oid, Gid::new(fid, offset));
            }
        }

        let mut edges = self.edges.clone();
        if self.undirected {
            edges.extend(self.edges.iter().map(|edge| RawEdge {
                src: edge.dst,
                dst: edge.src,
                ..*edge
            }));
        }

        let total_vertices_num = self.vertices.len();
        let fragments = owned
            .into_iter()
            .enumerate()
            .map(|(fid, inner)| {
                FragmentParts {
                    fid,
                    fnum,
                    label_num,
                    total_vertices_num,
                    inner,
                }
                .assemble(&self.vertices, &gids, &edges)
            })
            .collect::<Vec<_>>();
        for fragment in &fragments {
            debug!(
                "fragment {}: {} inner, {} outer vertices",
                fragment.fid,
                fragment.inner_vertices_num(),
                fragment.outer_vertices_num()
            );
        }
        Ok(fragments)
    }
}

struct FragmentParts {
    fid: Fid,
    fnum: usize,
    label_num: usize,
    total_vertices_num: usize,
    inner: Vec<(LabelId, Oid)>,
}

impl FragmentParts {
    fn assemble(
        self,
        vertices: &BTreeMap<Oid, VertexEntry>,
        gids: &HashMap<Oid, Gid>,
        edges: &[RawEdge],
    ) -> EdgeCutFragment {
        let fid = self.fid;
        let inner_num = self.inner.len();
        let owner = |oid: &Oid| gids[oid].fid();

        let outer_oids: BTreeSet<Oid> = edges
            .iter()
            .filter_map(|edge| {
                if owner(&edge.src) == fid && owner(&edge.dst) != fid {
                    Some(edge.dst)
                } else if owner(&edge.dst) == fid && owner(&edge.src) != fid {
                    Some(edge.src)
                } else {
                    None
                }
            })
            .collect();

        let mut oids: Vec<Oid> = Vec::with_capacity(inner_num + outer_oids.len());
        let mut labels: Vec<LabelId> = Vec::with_capacity(inner_num + outer_oids.len());
        for (label, oid) in &self.inner {
            oids.push(*oid);
            labels.push(*label);
        }
        let mut outer_gids = Vec::with_capacity(outer_oids.len());
        for oid in &outer_oids {
            oids.push(*oid);
            labels.push(vertices[oid].label);
            outer_gids.push(gids[oid]);
        }
        let local: HashMap<Oid, Vertex> = oids
            .iter()
            .enumerate()
            .map(|(index, oid)| (*oid, Vertex(index)))
            .collect();
        let outer_by_gid: HashMap<Gid, Vertex> = outer_gids
            .iter()
            .enumerate()
            .map(|(index, gid)| (*gid, Vertex(inner_num + index)))
            .collect();

        let mut outgoing: Vec<Vec<Edge>> = vec![Vec::new(); inner_num];
        let mut incoming: Vec<Vec<Edge>> = vec![Vec::new(); inner_num];
        for edge in edges {
            let src = local.get(&edge.src).copied();
            let dst = local.get(&edge.dst).copied();
            let (Some(src), Some(dst)) = (src, dst) else {
                continue;
            };
            if src.index() < inner_num {
                outgoing[src.index()].push(Edge {
                    neighbor: dst,
                    weight: edge.weight,
                    label: edge.label,
                });
            }
            if dst.index() < inner_num {
                incoming[dst.index()].push(Edge {
                    neighbor: src,
                    weight: edge.weight,
                    label: edge.label,
                });
            }
        }

        let mut label_ranges = Vec::with_capacity(self.label_num);
        let mut start = 0;
        for label in 0..self.label_num {
            let end = start
                + self.inner[start..]
                    .iter()
                    .take_while(|(l, _)| *l == label)
                    .count();
            label_ranges.push(start..end);
            start = end;
        }

        EdgeCutFragment {
            fid,
            fnum: self.fnum,
            total_vertices_num: self.total_vertices_num,
            inner_num,
            oids,
            labels,
            label_ranges,
            outer_gids,
            local,
            outer_by_gid,
            outgoing: Csr::from_lists(outgoing),
            incoming: Csr::from_lists(incoming),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Csr {
    offsets: Vec<usize>,
    edges: Vec<Edge>,
}

impl Csr {
    fn from_lists(lists: Vec<Vec<Edge>>) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        offsets.push(0);
        let mut edges = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        for list in lists {
            edges.extend(list);
            offsets.push(edges.len());
        }
        Self { offsets, edges }
    }

    fn neighbors(&self, v: Vertex) -> &[Edge] {
        match (self.offsets.get(v.index()), self.offsets.get(v.index() + 1)) {
            (Some(begin), Some(end)) => &self.edges[*begin..*end],
            _ => &[],
        }
    }
}

/// In-memory fragment of an edge-cut partitioned graph. Adjacency is kept
/// for inner vertices only; outer vertices are bare ghosts.
#[derive(Debug, Clone)]
pub struct EdgeCutFragment {
    fid: Fid,
    fnum: usize,
    total_vertices_num: usize,
    inner_num: usize,
    oids: Vec<Oid>,
    labels: Vec<LabelId>,
    label_ranges: Vec<Range<usize>>,
    outer_gids: Vec<Gid>,
    local: HashMap<Oid, Vertex>,
    outer_by_gid: HashMap<Gid, Vertex>,
    outgoing: Csr,
    incoming: Csr,
}

impl Fragment for EdgeCutFragment {
    fn fid(&self) -> Fid {
        self.fid
    }

    fn fnum(&self) -> usize {
        self.fnum
    }

    fn inner_vertices_num(&self) -> usize {
        self.inner_num
    }

    fn outer_vertices_num(&self) -> usize {
        self.outer_gids.len()
    }

    fn total_vertices_num(&self) -> usize {
        self.total_vertices_num
    }

    fn vertex_label_num(&self) -> usize {
        self.label_ranges.len()
    }

    fn inner_vertices_of_label(&self, label: LabelId) -> VertexRange {
        VertexRange::new(self.label_ranges.get(label).cloned().unwrap_or(0..0))
    }

    fn vertex_label(&self, v: Vertex) -> LabelId {
        self.labels[v.index()]
    }

    fn outgoing_edges(&self, v: Vertex) -> &[Edge] {
        self.outgoing.neighbors(v)
    }

    fn incoming_edges(&self, v: Vertex) -> &[Edge] {
        self.incoming.neighbors(v)
    }

    fn vertex_to_gid(&self, v: Vertex) -> Gid {
        if v.index() < self.inner_num {
            Gid::new(self.fid, v.index())
        } else {
            self.outer_gids[v.index() - self.inner_num]
        }
    }

    fn gid_to_vertex(&self, gid: Gid) -> Option<Vertex> {
        if gid.fid() == self.fid {
            (gid.offset() < self.inner_num).then_some(Vertex(gid.offset()))
        } else {
            self.outer_by_gid.get(&gid).copied()
        }
    }

    fn vertex_to_oid(&self, v: Vertex) -> Oid {
        self.oids[v.index()]
    }

    fn oid_to_vertex(&self, oid: Oid) -> Option<Vertex> {
        self.local.get(&oid).copied()
    }
}
