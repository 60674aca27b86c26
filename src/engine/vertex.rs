use std::fmt;

use super::graph::{Edge, Fragment, Gid, LabelId, Oid, Vertex};

/// Read-only handle to one vertex and its adjacency. The vertex value is
/// read and written through the compute context.
#[derive(Clone, Copy)]
pub struct VertexView<'a> {
    fragment: &'a dyn Fragment,
    vertex: Vertex,
}

impl<'a> VertexView<'a> {
    pub fn new(fragment: &'a dyn Fragment, vertex: Vertex) -> Self {
        Self { fragment, vertex }
    }

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn gid(&self) -> Gid {
        self.fragment.vertex_to_gid(self.vertex)
    }

    pub fn oid(&self) -> Oid {
        self.fragment.vertex_to_oid(self.vertex)
    }

    pub fn label(&self) -> LabelId {
        self.fragment.vertex_label(self.vertex)
    }

    pub fn outgoing_edges(&self) -> &'a [Edge] {
        self.fragment.outgoing_edges(self.vertex)
    }

    pub fn incoming_edges(&self) -> &'a [Edge] {
        self.fragment.incoming_edges(self.vertex)
    }

    pub fn outgoing_edges_with_label(&self, label: LabelId) -> impl Iterator<Item = &'a Edge> {
        self.outgoing_edges()
            .iter()
            .filter(move |edge| edge.label == label)
    }

    pub fn out_degree(&self) -> usize {
        self.outgoing_edges().len()
    }

    pub fn in_degree(&self) -> usize {
        self.incoming_edges().len()
    }

    pub fn fragment(&self) -> &'a dyn Fragment {
        self.fragment
    }
}

impl fmt::Debug for VertexView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexView")
            .field("vertex", &self.vertex)
            .field("oid", &self.oid())
            .finish()
    }
}
