// Copyright © 2024 Pathway

use std::collections::BTreeMap;

use assert_matches::assert_matches;

use pregel_engine::engine::error::DynResult;
use pregel_engine::engine::{
    run_local, run_parallel, AggregatorKind, Combiner, ComputeContext, Config, Error, Fragment,
    GraphBuilder, LocalMessageManager, Messages, SetupContext, StepOutcome, SumCombiner,
    SuperstepDriver, Traversal, VertexProgram, VertexView,
};

use super::helpers::{
    chain, collect_values, config, cycle, fragments, job, CountVertices, LabelOrder, PageRank,
    RecordDeliveries, Sssp,
};

#[test]
fn test_pagerank_on_cycle() -> eyre::Result<()> {
    let program = PageRank {
        delta: 0.8,
        max_round: 2,
    };
    let fragment = fragments(&cycle(4), 1).remove(0);
    let result = run_local(&fragment, &program, &Config::default(), job(&[]))?;
    assert_eq!(result.supersteps, 2);
    for (oid, rank) in &result.values {
        assert!((rank - 0.25).abs() < 1e-12, "rank of {oid} is {rank}");
    }
    Ok(())
}

#[test]
fn test_pagerank_is_partitioning_independent() -> eyre::Result<()> {
    let mut builder = GraphBuilder::new();
    for (src, dst) in [(0, 1), (0, 2), (1, 2), (2, 0), (3, 2), (4, 3), (4, 0)] {
        builder.add_edge(src, dst, 1.0);
    }
    let program = PageRank {
        delta: 0.85,
        max_round: 6,
    };
    let single = collect_values(&run_parallel(
        &fragments(&builder, 1),
        &program,
        &config(1),
        &job(&[]),
    )?);
    for workers in [2, 3] {
        let results = run_parallel(
            &fragments(&builder, workers),
            &program,
            &config(workers),
            &job(&[]),
        )?;
        let values = collect_values(&results);
        assert_eq!(values.len(), single.len());
        for (oid, rank) in &values {
            assert!((rank - single[oid]).abs() < 1e-9, "{workers} workers, vertex {oid}");
        }
        assert!(results.iter().all(|result| result.supersteps == 6));
    }
    Ok(())
}

#[test]
fn test_sssp() -> eyre::Result<()> {
    let builder = chain(&[5.0, 3.0]);
    for workers in [1, 2, 3] {
        let results = run_parallel(
            &fragments(&builder, workers),
            &Sssp::new(),
            &config(workers),
            &job(&[("source", "0")]),
        )?;
        let distances = collect_values(&results);
        assert_eq!(
            distances,
            BTreeMap::from([(0, 0.0), (1, 5.0), (2, 8.0)]),
            "{workers} workers"
        );
    }
    Ok(())
}

#[test]
fn test_sssp_unreachable_vertex() -> eyre::Result<()> {
    let mut builder = chain(&[2.0, 2.0]);
    builder.add_vertex(9)?;
    let fragment = fragments(&builder, 1).remove(0);
    let result = run_local(&fragment, &Sssp::new(), &Config::default(), job(&[("source", "1")]))?;
    assert_eq!(result.value_of(0), Some(&f64::INFINITY));
    assert_eq!(result.value_of(1), Some(&0.0));
    assert_eq!(result.value_of(2), Some(&2.0));
    assert_eq!(result.value_of(9), Some(&f64::INFINITY));
    Ok(())
}

#[test]
fn test_aggregator_is_worker_count_independent() -> eyre::Result<()> {
    let builder = cycle(4);
    for workers in [1, 2, 4] {
        let results = run_parallel(
            &fragments(&builder, workers),
            &CountVertices,
            &config(workers),
            &job(&[]),
        )?;
        let values = collect_values(&results);
        assert_eq!(values.len(), 4);
        assert!(values.values().all(|count| *count == 4), "{workers} workers");
        assert!(results.iter().all(|result| result.supersteps == 2));
    }
    Ok(())
}

#[test]
fn test_messages_visible_in_next_superstep_only() -> eyre::Result<()> {
    let builder = chain(&[1.0, 1.0, 1.0]);
    for workers in [1, 2, 4] {
        let results = run_parallel(
            &fragments(&builder, workers),
            &RecordDeliveries,
            &config(workers),
            &job(&[]),
        )?;
        let deliveries = collect_values(&results);
        assert!(deliveries[&0].is_empty());
        assert_eq!(deliveries[&1], vec![(1, 0)]);
        assert_eq!(deliveries[&2], vec![(2, 1)]);
        assert_eq!(deliveries[&3], vec![(3, 2)]);
        assert!(results.iter().all(|result| result.supersteps == 4));
    }
    Ok(())
}

#[test]
fn test_isolated_vertex_terminates() -> eyre::Result<()> {
    let mut builder = GraphBuilder::new();
    builder.add_vertex(7)?;
    let program = PageRank {
        delta: 0.85,
        max_round: 10,
    };
    let fragment = fragments(&builder, 1).remove(0);
    let result = run_local(&fragment, &program, &Config::default(), job(&[]))?;
    assert_eq!(result.supersteps, 10);
    let rank = result.value_of(7).copied().unwrap_or_default();
    assert!((rank - 0.15).abs() < 1e-12);
    Ok(())
}

/// Every vertex counts itself and halts right away; vertices with edges
/// also ping their neighbors. The value is `(count, pings, activations)`.
struct CountAndPing;

impl VertexProgram<(i64, usize, u64), ()> for CountAndPing {
    fn setup(&self, ctx: &mut SetupContext<'_>) -> DynResult<()> {
        ctx.register_aggregator("count", AggregatorKind::INT64_SUM)?;
        Ok(())
    }

    fn init(
        &self,
        _vertex: VertexView<'_>,
        _ctx: &mut ComputeContext<'_, (i64, usize, u64), ()>,
    ) -> DynResult<()> {
        Ok(())
    }

    fn compute(
        &self,
        messages: Messages<()>,
        vertex: VertexView<'_>,
        ctx: &mut ComputeContext<'_, (i64, usize, u64), ()>,
    ) -> DynResult<()> {
        let v = vertex.vertex();
        let (mut count, mut pings, activations) = *ctx.get_vertex_value(v)?;
        if ctx.superstep() == 0 {
            ctx.aggregate("count", 1_i64)?;
            ctx.send_to_neighbors(&vertex, ());
        } else {
            count = ctx.get_aggregated_value("count")?;
            pings += messages.len();
        }
        ctx.set_vertex_value(v, (count, pings, activations + 1))?;
        ctx.vote_to_halt(v)?;
        Ok(())
    }
}

#[test]
fn test_isolated_vertex_in_aggregator_rounds() -> eyre::Result<()> {
    let mut builder = cycle(4);
    builder.add_vertex(9)?;
    for workers in [1, 2] {
        let results = run_parallel(
            &fragments(&builder, workers),
            &CountVertices,
            &config(workers),
            &job(&[]),
        )?;
        let counts = collect_values(&results);
        assert_eq!(counts[&9], 5, "{workers} workers");
        assert!(counts.values().all(|count| *count == 5));
        assert!(results.iter().all(|result| result.supersteps == 2));

        let results = run_parallel(
            &fragments(&builder, workers),
            &CountAndPing,
            &config(workers),
            &job(&[]),
        )?;
        let values = collect_values(&results);
        // halted at superstep 0 and never woken up by a message
        assert_eq!(values[&9], (0, 0, 1), "{workers} workers");
        for oid in 0..4 {
            assert_eq!(values[&oid], (5, 1, 2), "vertex {oid}");
        }
        assert!(results.iter().all(|result| result.supersteps == 2));
    }
    Ok(())
}

#[test]
fn test_phase_order() -> eyre::Result<()> {
    let fragment = fragments(&cycle(3), 1).remove(0);
    let mut driver = SuperstepDriver::new(
        &fragment,
        &CountVertices,
        Box::new(LocalMessageManager::new()),
        &Config::default(),
        job(&[]),
    )?;
    assert_matches!(driver.inc_eval(), Err(Error::InvalidPhase(_)));
    assert_eq!(driver.peval()?, StepOutcome::Continue);
    assert_matches!(driver.peval(), Err(Error::InvalidPhase(_)));
    assert_eq!(driver.inc_eval()?, StepOutcome::Done);
    Ok(())
}

#[test]
fn test_empty_fragment_worker() -> eyre::Result<()> {
    // oid 1 and 3 both land on fragment 1, fragment 0 owns nothing
    let mut builder = GraphBuilder::new();
    builder.add_edge(1, 3, 1.0);
    let results = run_parallel(&fragments(&builder, 2), &CountVertices, &config(2), &job(&[]))?;
    assert!(results[0].values.is_empty());
    assert_eq!(collect_values(&results), BTreeMap::from([(1, 2), (3, 2)]));
    Ok(())
}

fn labeled_graph() -> eyre::Result<GraphBuilder> {
    let mut builder = GraphBuilder::new();
    for (oid, label) in [(0, 1), (1, 0), (2, 1), (3, 0), (4, 2)] {
        builder.add_labeled_vertex(oid, label)?;
    }
    builder.add_labeled_edge(0, 1, 1.0, 0);
    builder.add_labeled_edge(1, 4, 1.0, 1);
    builder.add_labeled_edge(3, 4, 1.0, 1);
    builder.add_labeled_edge(2, 0, 1.0, 0);
    Ok(builder)
}

#[test]
fn test_by_label_visits_labels_in_order() -> eyre::Result<()> {
    let fragment = fragments(&labeled_graph()?, 1).remove(0);
    let program = LabelOrder::default();
    let config = Config::new(1, 1)?.with_traversal(Traversal::ByLabel);
    let result = run_local(&fragment, &program, &config, job(&[]))?;

    let visits = program.visits.into_inner()?;
    let peval: Vec<_> = visits
        .iter()
        .filter(|(superstep, _)| *superstep == 0)
        .map(|(_, label)| *label)
        .collect();
    assert_eq!(peval, vec![0, 0, 1, 1, 2]);
    let superstep_one: Vec<_> = visits
        .iter()
        .filter(|(superstep, _)| *superstep == 1)
        .map(|(_, label)| *label)
        .collect();
    // receivers: 1 (label 0), 0 (label 1), 4 (label 2)
    assert_eq!(superstep_one, vec![0, 1, 2]);

    assert_eq!(result.value_of(4), Some(&4));
    assert_eq!(result.value_of(1), Some(&0));
    assert_eq!(result.value_of(0), Some(&2));
    Ok(())
}

#[test]
fn test_traversals_agree() -> eyre::Result<()> {
    let builder = labeled_graph()?;
    for workers in [1, 2] {
        let flat = run_parallel(
            &fragments(&builder, workers),
            &LabelOrder::default(),
            &config(workers),
            &job(&[]),
        )?;
        let by_label = run_parallel(
            &fragments(&builder, workers),
            &LabelOrder::default(),
            &config(workers).with_traversal(Traversal::ByLabel),
            &job(&[]),
        )?;
        assert_eq!(collect_values(&flat), collect_values(&by_label));
    }
    Ok(())
}

/// Every leaf sends its oid to the hub, which records how many messages
/// arrived and their sum.
struct Star {
    combine: bool,
    combiner: SumCombiner<i64>,
}

impl VertexProgram<(usize, i64), i64> for Star {
    fn init(
        &self,
        _vertex: VertexView<'_>,
        _ctx: &mut ComputeContext<'_, (usize, i64), i64>,
    ) -> DynResult<()> {
        Ok(())
    }

    fn compute(
        &self,
        messages: Messages<i64>,
        vertex: VertexView<'_>,
        ctx: &mut ComputeContext<'_, (usize, i64), i64>,
    ) -> DynResult<()> {
        let v = vertex.vertex();
        if ctx.superstep() == 0 {
            #[allow(clippy::cast_possible_wrap)]
            ctx.send_to_neighbors(&vertex, vertex.oid() as i64);
        } else {
            let count = messages.len();
            let sum: i64 = messages.sum();
            ctx.set_vertex_value(v, (count, sum))?;
        }
        ctx.vote_to_halt(v)?;
        Ok(())
    }

    fn combiner(&self) -> Option<&dyn Combiner<i64>> {
        self.combine.then_some(&self.combiner as &dyn Combiner<i64>)
    }
}

fn star() -> GraphBuilder {
    let mut builder = GraphBuilder::new();
    for leaf in 1..=4 {
        builder.add_edge(leaf, 0, 1.0);
    }
    builder
}

#[test]
fn test_combiner_reduces_per_destination() -> eyre::Result<()> {
    let fragment = fragments(&star(), 1).remove(0);
    let program = Star {
        combine: true,
        combiner: SumCombiner::new(),
    };
    let result = run_local(&fragment, &program, &Config::default(), job(&[]))?;
    assert_eq!(result.value_of(0), Some(&(1, 10)));
    Ok(())
}

#[test]
fn test_without_combiner_messages_are_appended() -> eyre::Result<()> {
    let fragment = fragments(&star(), 1).remove(0);
    let program = Star {
        combine: false,
        combiner: SumCombiner::new(),
    };
    let result = run_local(&fragment, &program, &Config::default(), job(&[]))?;
    assert_eq!(result.value_of(0), Some(&(4, 10)));
    Ok(())
}

#[test]
fn test_combiner_runs_once_per_worker() -> eyre::Result<()> {
    let program = Star {
        combine: true,
        combiner: SumCombiner::new(),
    };
    let results = run_parallel(&fragments(&star(), 2), &program, &config(2), &job(&[]))?;
    // leaves 2 and 4 are local to the hub, 1 and 3 are combined by their worker
    assert_eq!(collect_values(&results)[&0], (2, 10));
    Ok(())
}

/// Vertex 0 sends a single message along its edge; the combiner tags it.
struct Relay {
    combiner: fn(Vec<i64>) -> i64,
}

impl VertexProgram<i64, i64> for Relay {
    fn init(&self, _vertex: VertexView<'_>, _ctx: &mut ComputeContext<'_, i64, i64>) -> DynResult<()> {
        Ok(())
    }

    fn compute(
        &self,
        messages: Messages<i64>,
        vertex: VertexView<'_>,
        ctx: &mut ComputeContext<'_, i64, i64>,
    ) -> DynResult<()> {
        let v = vertex.vertex();
        if ctx.superstep() == 0 && vertex.oid() == 0 {
            ctx.send_to_neighbors(&vertex, 1);
        }
        for message in messages {
            ctx.set_vertex_value(v, message)?;
        }
        ctx.vote_to_halt(v)?;
        Ok(())
    }

    fn combiner(&self) -> Option<&dyn Combiner<i64>> {
        Some(&self.combiner)
    }
}

#[test]
fn test_combiner_sees_single_messages() -> eyre::Result<()> {
    let program = Relay {
        combiner: |messages| messages.iter().sum::<i64>() + 100,
    };
    // one worker loops the message back, two workers ship it
    for workers in [1, 2] {
        let results = run_parallel(
            &fragments(&chain(&[1.0]), workers),
            &program,
            &config(workers),
            &job(&[]),
        )?;
        assert_eq!(collect_values(&results)[&1], 101, "{workers} workers");
    }
    Ok(())
}

#[test]
fn test_closure_combiner() -> eyre::Result<()> {
    let combiner = |messages: Vec<i64>| messages.into_iter().max().unwrap_or_default();
    assert_eq!(Combiner::combine(&combiner, vec![3, 9, 4]).ok(), Some(9));
    Ok(())
}

#[test]
fn test_fragment_sends_to_gid_of_remote_vertex() -> eyre::Result<()> {
    /// Vertex 0 greets vertex 3 by global id, with no edge between them.
    struct Greeter;

    impl VertexProgram<i64, i64> for Greeter {
        fn init(&self, _vertex: VertexView<'_>, _ctx: &mut ComputeContext<'_, i64, i64>) -> DynResult<()> {
            Ok(())
        }

        fn compute(
            &self,
            messages: Messages<i64>,
            vertex: VertexView<'_>,
            ctx: &mut ComputeContext<'_, i64, i64>,
        ) -> DynResult<()> {
            let v = vertex.vertex();
            if ctx.superstep() == 0 && vertex.oid() == 0 {
                // fragment 1 of 2 holds oids 1 and 3, sorted by oid
                let target = pregel_engine::engine::Gid::new(1, 1);
                ctx.send_to_gid(target, 42)?;
            }
            for message in messages {
                ctx.set_vertex_value(v, message)?;
            }
            ctx.vote_to_halt(v)?;
            Ok(())
        }
    }

    let builder = cycle(4);
    let fragments = fragments(&builder, 2);
    assert_eq!(fragments[1].vertex_to_oid(pregel_engine::engine::Vertex(1)), 3);
    let results = run_parallel(&fragments, &Greeter, &config(2), &job(&[]))?;
    assert_eq!(collect_values(&results)[&3], 42);
    Ok(())
}
