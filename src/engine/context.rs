// Copyright © 2024 Pathway

use std::error;
use std::mem::{swap, take};
use std::ops::Range;
use std::str::FromStr;

use rayon::prelude::*;
use rayon::ThreadPool;

use super::aggregator::{AggregatorRegistry, LocalAggregates};
use super::config::JobConfig;
use super::error::{Error, Result};
use super::graph::{Fragment, Gid, Vertex};
use super::reduce::AggregatorKind;
use super::value::Aggregatable;
use super::vertex::VertexView;

/// Where a message produced during compute is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// An inner or outer vertex of this fragment.
    Local(Vertex),
    /// A vertex of another fragment that is not a ghost here.
    Remote(Gid),
}

/// Side effects of one parallel chunk, merged after the parallel region.
#[derive(Debug)]
pub(crate) struct Effects<MD> {
    pub(crate) outbox: Vec<(Target, MD)>,
    pub(crate) aggregates: LocalAggregates,
    pub(crate) newly_halted: usize,
    pub(crate) newly_active: usize,
    pub(crate) force_continue: bool,
}

impl<MD> Effects<MD> {
    fn new() -> Self {
        Self {
            outbox: Vec::new(),
            aggregates: LocalAggregates::new(),
            newly_halted: 0,
            newly_active: 0,
            force_continue: false,
        }
    }

    fn append(&mut self, registry: &AggregatorRegistry, other: Self) -> Result<()> {
        self.outbox.extend(other.outbox);
        self.aggregates.merge(registry, other.aggregates)?;
        self.newly_halted += other.newly_halted;
        self.newly_active += other.newly_active;
        self.force_continue |= other.force_continue;
        Ok(())
    }
}

/// The channel through which a vertex program acts during one superstep.
///
/// A context covers a disjoint chunk of inner vertices: values and halt
/// flags of that chunk are written in place, everything else (messages,
/// aggregation, continuation requests) is buffered locally and merged by
/// the driver once all chunks finished.
pub struct ComputeContext<'a, VD, MD> {
    fragment: &'a dyn Fragment,
    superstep: u64,
    config: &'a JobConfig,
    aggregators: &'a AggregatorRegistry,
    base: usize,
    values: &'a mut [VD],
    halted: &'a mut [bool],
    effects: Effects<MD>,
}

impl<'a, VD, MD> ComputeContext<'a, VD, MD> {
    pub(crate) fn new(
        fragment: &'a dyn Fragment,
        superstep: u64,
        config: &'a JobConfig,
        aggregators: &'a AggregatorRegistry,
        base: usize,
        values: &'a mut [VD],
        halted: &'a mut [bool],
    ) -> Self {
        debug_assert_eq!(values.len(), halted.len());
        Self {
            fragment,
            superstep,
            config,
            aggregators,
            base,
            values,
            halted,
            effects: Effects::new(),
        }
    }

    pub(crate) fn into_effects(self) -> Effects<MD> {
        self.effects
    }

    pub fn superstep(&self) -> u64 {
        self.superstep
    }

    pub fn fragment(&self) -> &'a dyn Fragment {
        self.fragment
    }

    pub fn view(&self, v: Vertex) -> VertexView<'a> {
        VertexView::new(self.fragment, v)
    }

    fn owned_index(&self, v: Vertex) -> Result<usize> {
        v.index()
            .checked_sub(self.base)
            .filter(|index| *index < self.values.len())
            .ok_or(Error::NotOwned(v))
    }

    pub fn get_vertex_value(&self, v: Vertex) -> Result<&VD> {
        let index = self.owned_index(v)?;
        Ok(&self.values[index])
    }

    pub fn vertex_value_mut(&mut self, v: Vertex) -> Result<&mut VD> {
        let index = self.owned_index(v)?;
        Ok(&mut self.values[index])
    }

    pub fn set_vertex_value(&mut self, v: Vertex, value: VD) -> Result<()> {
        *self.vertex_value_mut(v)? = value;
        Ok(())
    }

    /// Idempotent; only the first vote of an active vertex counts.
    pub fn vote_to_halt(&mut self, v: Vertex) -> Result<()> {
        let index = self.owned_index(v)?;
        if !self.halted[index] {
            self.halted[index] = true;
            self.effects.newly_halted += 1;
        }
        Ok(())
    }

    pub fn activate(&mut self, v: Vertex) -> Result<()> {
        let index = self.owned_index(v)?;
        if self.halted[index] {
            self.halted[index] = false;
            self.effects.newly_active += 1;
        }
        Ok(())
    }

    pub fn is_halted(&self, v: Vertex) -> Result<bool> {
        let index = self.owned_index(v)?;
        Ok(self.halted[index])
    }

    /// Sends to an inner or outer vertex of this fragment. The message is
    /// visible to the destination in the next superstep.
    pub fn send(&mut self, dst: Vertex, message: MD) -> Result<()> {
        if dst.index() >= self.fragment.local_vertices_num() {
            return Err(Error::UnknownLocalVertex(dst));
        }
        self.effects.outbox.push((Target::Local(dst), message));
        Ok(())
    }

    /// Sends to an arbitrary vertex by global id, including vertices this
    /// fragment holds no ghost for.
    pub fn send_to_gid(&mut self, dst: Gid, message: MD) -> Result<()> {
        let target = if let Some(v) = self.fragment.gid_to_vertex(dst) {
            Target::Local(v)
        } else if dst.fid() >= self.fragment.fnum() || dst.fid() == self.fragment.fid() {
            return Err(Error::UnknownVertex(dst));
        } else {
            Target::Remote(dst)
        };
        self.effects.outbox.push((target, message));
        Ok(())
    }

    /// Ships a message towards the owner of a ghost vertex.
    pub fn sync_state_on_outer_vertex(&mut self, v: Vertex, message: MD) -> Result<()> {
        if !self.fragment.is_outer_vertex(v) {
            return Err(Error::NotOuterVertex(v));
        }
        self.effects.outbox.push((Target::Local(v), message));
        Ok(())
    }

    pub fn send_to_neighbors(&mut self, vertex: &VertexView<'_>, message: MD)
    where
        MD: Clone,
    {
        self.effects.outbox.extend(
            vertex
                .outgoing_edges()
                .iter()
                .map(|edge| (Target::Local(edge.neighbor), message.clone())),
        );
    }

    pub fn aggregate<T: Aggregatable>(&mut self, name: &str, value: T) -> Result<()> {
        self.effects
            .aggregates
            .aggregate(self.aggregators, name, value.into_value())
    }

    /// Merged value of the previous superstep.
    pub fn get_aggregated_value<T: Aggregatable>(&self, name: &str) -> Result<T> {
        self.aggregators.get_aggregated_value(name)
    }

    pub fn get_config(&self, key: &str) -> Option<&'a str> {
        self.config.get(key)
    }

    pub fn get_config_as<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: error::Error + Send + Sync + 'static,
    {
        self.config.get_as(key)
    }

    /// Vetoes termination after this superstep even if every vertex halted.
    pub fn force_continue(&mut self) {
        self.effects.force_continue = true;
    }
}

/// Handed to [`VertexProgram::setup`](super::program::VertexProgram::setup)
/// before superstep 0.
pub struct SetupContext<'a> {
    fragment: &'a dyn Fragment,
    config: &'a JobConfig,
    aggregators: &'a mut AggregatorRegistry,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(
        fragment: &'a dyn Fragment,
        config: &'a JobConfig,
        aggregators: &'a mut AggregatorRegistry,
    ) -> Self {
        Self {
            fragment,
            config,
            aggregators,
        }
    }

    pub fn register_aggregator(&mut self, name: &str, kind: AggregatorKind) -> Result<()> {
        self.aggregators.register(name, kind)
    }

    pub fn get_config(&self, key: &str) -> Option<&'a str> {
        self.config.get(key)
    }

    pub fn get_config_as<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: error::Error + Send + Sync + 'static,
    {
        self.config.get_as(key)
    }

    pub fn fragment(&self) -> &'a dyn Fragment {
        self.fragment
    }
}

/// Per-worker state of a computation: vertex values, halt flags, mailboxes,
/// aggregators and job configuration.
pub struct WorkerContext<VD, MD> {
    values: Vec<VD>,
    halted: Vec<bool>,
    halted_count: usize,
    inbox: Vec<Vec<MD>>,
    next_inbox: Vec<Vec<MD>>,
    aggregators: AggregatorRegistry,
    config: JobConfig,
    superstep: u64,
}

impl<VD: Default, MD> WorkerContext<VD, MD> {
    pub fn new(fragment: &dyn Fragment, config: JobConfig) -> Self {
        let inner = fragment.inner_vertices_num();
        Self {
            values: (0..inner).map(|_| VD::default()).collect(),
            halted: vec![false; inner],
            halted_count: 0,
            inbox: (0..inner).map(|_| Vec::new()).collect(),
            next_inbox: (0..inner).map(|_| Vec::new()).collect(),
            aggregators: AggregatorRegistry::new(),
            config,
            superstep: 0,
        }
    }
}

impl<VD, MD> WorkerContext<VD, MD> {
    pub fn superstep(&self) -> u64 {
        self.superstep
    }

    pub(crate) fn advance_superstep(&mut self) -> u64 {
        self.superstep += 1;
        self.superstep
    }

    pub fn inner_vertices_num(&self) -> usize {
        self.values.len()
    }

    pub fn halted_count(&self) -> usize {
        self.halted_count
    }

    /// True iff every inner vertex of this worker voted to halt.
    pub fn all_halted(&self) -> bool {
        self.halted_count == self.values.len()
    }

    fn inner_index(&self, v: Vertex) -> Result<usize> {
        if v.index() < self.values.len() {
            Ok(v.index())
        } else {
            Err(Error::NotOwned(v))
        }
    }

    pub fn vote_to_halt(&mut self, v: Vertex) -> Result<()> {
        let index = self.inner_index(v)?;
        if !self.halted[index] {
            self.halted[index] = true;
            self.halted_count += 1;
        }
        Ok(())
    }

    pub fn activate(&mut self, v: Vertex) -> Result<()> {
        let index = self.inner_index(v)?;
        if self.halted[index] {
            self.halted[index] = false;
            self.halted_count -= 1;
        }
        Ok(())
    }

    pub fn is_halted(&self, v: Vertex) -> Result<bool> {
        Ok(self.halted[self.inner_index(v)?])
    }

    pub fn get_vertex_value(&self, v: Vertex) -> Result<&VD> {
        Ok(&self.values[self.inner_index(v)?])
    }

    pub fn set_vertex_value(&mut self, v: Vertex, value: VD) -> Result<()> {
        let index = self.inner_index(v)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn values(&self) -> &[VD] {
        &self.values
    }

    pub fn into_values(self) -> Vec<VD> {
        self.values
    }

    pub fn register_aggregator(&mut self, name: &str, kind: AggregatorKind) -> Result<()> {
        self.aggregators.register(name, kind)
    }

    pub fn aggregate<T: Aggregatable>(&mut self, name: &str, value: T) -> Result<()> {
        self.aggregators.aggregate(name, value)
    }

    pub fn get_aggregated_value<T: Aggregatable>(&self, name: &str) -> Result<T> {
        self.aggregators.get_aggregated_value(name)
    }

    pub fn aggregators(&self) -> &AggregatorRegistry {
        &self.aggregators
    }

    pub fn aggregators_mut(&mut self) -> &mut AggregatorRegistry {
        &mut self.aggregators
    }

    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.config.get(key)
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub(crate) fn setup_parts(&mut self) -> (&JobConfig, &mut AggregatorRegistry) {
        (&self.config, &mut self.aggregators)
    }

    pub(crate) fn next_inbox_mut(&mut self) -> &mut [Vec<MD>] {
        &mut self.next_inbox
    }

    /// Makes last round's deliveries visible and reactivates their
    /// destinations. Returns the number of vertices holding messages.
    pub(crate) fn begin_round(&mut self) -> usize {
        swap(&mut self.inbox, &mut self.next_inbox);
        self.next_inbox.iter_mut().for_each(Vec::clear);
        let mut receivers = 0;
        for (index, messages) in self.inbox.iter().enumerate() {
            if !messages.is_empty() {
                receivers += 1;
                if self.halted[index] {
                    self.halted[index] = false;
                    self.halted_count -= 1;
                }
            }
        }
        receivers
    }

    pub(crate) fn clear_inbox(&mut self) {
        self.inbox.iter_mut().for_each(Vec::clear);
    }

    /// Runs `visit` for every inner vertex in `range`, splitting the range
    /// into chunks processed on `pool`. Per-chunk effects are merged in
    /// chunk order; halt counters and aggregates are applied here, the
    /// merged outbox is returned.
    pub(crate) fn par_compute<F>(
        &mut self,
        fragment: &dyn Fragment,
        range: Range<usize>,
        chunk_size: usize,
        pool: &ThreadPool,
        visit: F,
    ) -> Result<(Vec<(Target, MD)>, bool)>
    where
        VD: Send,
        MD: Send,
        F: Fn(&mut ComputeContext<'_, VD, MD>, Vertex, Vec<MD>) -> Result<()> + Send + Sync,
    {
        let chunk_size = chunk_size.max(1);
        let start = range.start;
        let superstep = self.superstep;
        let Self {
            values,
            halted,
            inbox,
            aggregators,
            config,
            ..
        } = self;
        let registry: &AggregatorRegistry = aggregators;
        let config: &JobConfig = config;

        let chunks: Vec<Effects<MD>> = pool.install(|| {
            values[range.clone()]
                .par_chunks_mut(chunk_size)
                .zip(halted[range.clone()].par_chunks_mut(chunk_size))
                .zip(inbox[range.clone()].par_chunks_mut(chunk_size))
                .enumerate()
                .map(|(index, ((values, halted), inbox))| {
                    let base = start + index * chunk_size;
                    let mut ctx = ComputeContext::new(
                        fragment, superstep, config, registry, base, values, halted,
                    );
                    for (offset, messages) in inbox.iter_mut().enumerate() {
                        visit(&mut ctx, Vertex(base + offset), take(messages))?;
                    }
                    Ok(ctx.into_effects())
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut merged = Effects::new();
        for effects in chunks {
            merged.append(registry, effects)?;
        }
        self.halted_count = self.halted_count + merged.newly_halted - merged.newly_active;
        self.aggregators.absorb(merged.aggregates)?;
        Ok((merged.outbox, merged.force_continue))
    }
}
