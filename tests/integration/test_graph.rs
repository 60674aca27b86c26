// Copyright © 2024 Pathway

use assert_matches::assert_matches;

use pregel_engine::engine::{
    Error, Fragment, Gid, GraphBuilder, Partitioner, Vertex, VertexRange, VertexView,
};

use super::helpers::{cycle, fragments};

#[test]
fn test_gid_layout() {
    let gid = Gid::new(3, 17);
    assert_eq!(gid.fid(), 3);
    assert_eq!(gid.offset(), 17);
    assert_eq!(gid.to_string(), "3:17");
}

#[test]
fn test_cycle_fragments() {
    let fragments = fragments(&cycle(4), 2);
    assert_eq!(fragments.len(), 2);
    for (fid, fragment) in fragments.iter().enumerate() {
        assert_eq!(fragment.fid(), fid);
        assert_eq!(fragment.fnum(), 2);
        assert_eq!(fragment.inner_vertices_num(), 2);
        assert_eq!(fragment.outer_vertices_num(), 2);
        assert_eq!(fragment.total_vertices_num(), 4);
        assert_eq!(fragment.local_vertices_num(), 4);
    }

    let first = &fragments[0];
    let oids: Vec<_> = first
        .inner_vertices()
        .map(|v| first.vertex_to_oid(v))
        .collect();
    assert_eq!(oids, vec![0, 2]);
    let ghosts: Vec<_> = first
        .outer_vertices()
        .map(|v| first.vertex_to_oid(v))
        .collect();
    assert_eq!(ghosts, vec![1, 3]);

    let ghost = first.oid_to_vertex(3).unwrap_or(Vertex(usize::MAX));
    assert!(first.is_outer_vertex(ghost));
    assert_eq!(first.vertex_to_gid(ghost), Gid::new(1, 1));
    assert_eq!(first.gid_to_vertex(Gid::new(1, 1)), Some(ghost));
    assert_eq!(first.gid_to_vertex(Gid::new(0, 1)), Some(Vertex(1)));
    assert_eq!(first.gid_to_vertex(Gid::new(0, 2)), None);
}

#[test]
fn test_adjacency_of_inner_vertices() {
    let fragment = fragments(&cycle(4), 1).remove(0);
    let view = VertexView::new(&fragment, Vertex(1));
    assert_eq!(view.oid(), 1);
    assert_eq!(view.out_degree(), 1);
    assert_eq!(view.in_degree(), 1);
    assert_eq!(view.outgoing_edges()[0].neighbor, Vertex(2));
    assert_eq!(view.incoming_edges()[0].neighbor, Vertex(0));
    assert_eq!(view.gid(), Gid::new(0, 1));
}

#[test]
fn test_undirected_graph() {
    let mut builder = GraphBuilder::new().undirected();
    builder.add_edge(0, 1, 2.0);
    let fragment = fragments(&builder, 1).remove(0);
    let zero = VertexView::new(&fragment, Vertex(0));
    let one = VertexView::new(&fragment, Vertex(1));
    assert_eq!(zero.out_degree(), 1);
    assert_eq!(one.out_degree(), 1);
    assert_eq!(one.outgoing_edges()[0].weight, 2.0);
}

#[test]
fn test_labels_own_contiguous_ranges() -> eyre::Result<()> {
    let mut builder = GraphBuilder::new();
    builder.add_labeled_vertex(10, 2)?;
    builder.add_labeled_vertex(11, 0)?;
    builder.add_labeled_vertex(12, 2)?;
    builder.add_labeled_edge(11, 13, 1.0, 1);
    builder.add_labeled_edge(10, 12, 1.0, 0);
    builder.add_labeled_edge(12, 11, 1.0, 1);
    let fragment = fragments(&builder, 1).remove(0);

    assert_eq!(fragment.vertex_label_num(), 3);
    assert_eq!(
        fragment.inner_vertices_of_label(0),
        VertexRange::new(0..2)
    );
    assert!(fragment.inner_vertices_of_label(1).is_empty());
    assert_eq!(
        fragment.inner_vertices_of_label(2),
        VertexRange::new(2..4)
    );
    let labels: Vec<_> = fragment
        .inner_vertices()
        .map(|v| (fragment.vertex_to_oid(v), fragment.vertex_label(v)))
        .collect();
    assert_eq!(labels, vec![(11, 0), (13, 0), (10, 2), (12, 2)]);

    let view = VertexView::new(&fragment, Vertex(0));
    assert_eq!(view.outgoing_edges_with_label(1).count(), 1);
    assert_eq!(view.outgoing_edges_with_label(0).count(), 0);
    Ok(())
}

#[test]
fn test_conflicting_labels() -> eyre::Result<()> {
    let mut builder = GraphBuilder::new();
    builder.add_edge(1, 2, 1.0);
    // implicit vertices take the first explicit label
    builder.add_labeled_vertex(1, 4)?;
    builder.add_labeled_vertex(1, 4)?;
    assert_matches!(
        builder.add_labeled_vertex(1, 3),
        Err(Error::DuplicateVertex(1))
    );
    Ok(())
}

#[test]
fn test_invalid_fragment_count() {
    assert_matches!(cycle(3).build(0), Err(Error::InvalidFragment(0)));
}

struct Halves;

impl Partitioner for Halves {
    fn fnum(&self) -> usize {
        2
    }

    fn fragment_of(&self, oid: u64) -> usize {
        usize::from(oid >= 2)
    }
}

#[test]
fn test_custom_partitioner() -> eyre::Result<()> {
    let fragments = cycle(4).build_with(&Halves)?;
    let owned: Vec<Vec<u64>> = fragments
        .iter()
        .map(|fragment| {
            fragment
                .inner_vertices()
                .map(|v| fragment.vertex_to_oid(v))
                .collect()
        })
        .collect();
    assert_eq!(owned, vec![vec![0, 1], vec![2, 3]]);
    // 1 -> 2 and 3 -> 0 cross the cut
    assert_eq!(fragments[0].outer_vertices_num(), 2);
    Ok(())
}
