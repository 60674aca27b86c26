// Copyright © 2024 Pathway

use std::fmt::{self, Display};
use std::ops::Range;
use std::str::FromStr;

use bincode::{deserialize, serialize};
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::config::{Config, Error as ConfigError, JobConfig};
use super::context::{SetupContext, Target, WorkerContext};
use super::error::{DynError, Error, Result};
use super::graph::{Fragment, Vertex};
use super::mailbox::{deliver, Mailbox};
use super::program::{Messages, VertexProgram};
use super::transport::MessageManager;
use super::vertex::VertexView;

const CHUNKS_PER_THREAD: usize = 4;

/// How inner vertices are grouped into parallel regions within a superstep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Traversal {
    /// All inner vertices form one region.
    #[default]
    Flat,
    /// One region per vertex label, in ascending label order.
    ByLabel,
}

impl FromStr for Traversal {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "by-label" | "by_label" | "bylabel" => Ok(Self::ByLabel),
            _ => Err(ConfigError::UnknownTraversal(s.to_owned())),
        }
    }
}

impl Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::ByLabel => write!(f, "by-label"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Done,
}

/// What every worker tells every other worker at the end of a superstep.
#[derive(Debug, Serialize, Deserialize)]
struct RoundReport {
    aggregators: Vec<u8>,
    all_halted: bool,
    sent_messages: u64,
    force_continue: bool,
}

/// Runs the supersteps of one worker over one fragment.
pub struct SuperstepDriver<'a, VD, MD> {
    fragment: &'a dyn Fragment,
    program: &'a dyn VertexProgram<VD, MD>,
    transport: Box<dyn MessageManager + 'a>,
    context: WorkerContext<VD, MD>,
    mailbox: Mailbox<MD>,
    pool: ThreadPool,
    threads: usize,
    traversal: Traversal,
    max_supersteps: Option<u64>,
    started: bool,
}

impl<'a, VD, MD> SuperstepDriver<'a, VD, MD>
where
    VD: Default + Send,
    MD: Serialize + DeserializeOwned + Send,
{
    /// Prepares the worker and runs the program's setup.
    pub fn new(
        fragment: &'a dyn Fragment,
        program: &'a dyn VertexProgram<VD, MD>,
        transport: Box<dyn MessageManager + 'a>,
        config: &Config,
        job: JobConfig,
    ) -> Result<Self> {
        let fid = fragment.fid();
        if transport.fid() != fid || transport.fnum() != fragment.fnum() {
            return Err(Error::InvalidFragment(fid));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads())
            .thread_name(move |index| format!("pregel:{fid}-compute-{index}"))
            .build()
            .map_err(|e| Error::Other(Box::new(e)))?;

        let mut context = WorkerContext::new(fragment, job);
        let (job, aggregators) = context.setup_parts();
        program
            .setup(&mut SetupContext::new(fragment, job, aggregators))
            .map_err(Error::Setup)?;
        debug!(
            "worker {fid}: {} inner and {} outer vertices, {} aggregators",
            fragment.inner_vertices_num(),
            fragment.outer_vertices_num(),
            context.aggregators().names().count()
        );

        Ok(Self {
            fragment,
            program,
            transport,
            context,
            mailbox: Mailbox::new(),
            pool,
            threads: config.threads(),
            traversal: config.traversal(),
            max_supersteps: config.max_supersteps(),
            started: false,
        })
    }

    pub fn fragment(&self) -> &'a dyn Fragment {
        self.fragment
    }

    pub fn superstep(&self) -> u64 {
        self.context.superstep()
    }

    pub fn context(&self) -> &WorkerContext<VD, MD> {
        &self.context
    }

    pub fn into_context(self) -> WorkerContext<VD, MD> {
        self.context
    }

    /// Superstep 0: `init` and `compute` without messages on every inner
    /// vertex.
    pub fn peval(&mut self) -> Result<StepOutcome> {
        if self.started {
            return Err(Error::InvalidPhase("PEval already ran"));
        }
        self.started = true;
        info!("worker {}: PEval ({})", self.fragment.fid(), self.traversal);
        let result = self.run_peval();
        self.abort_on_error(result)
    }

    /// Supersteps 1 and later.
    pub fn inc_eval(&mut self) -> Result<StepOutcome> {
        if !self.started {
            return Err(Error::InvalidPhase("IncEval called before PEval"));
        }
        let result = self.run_inc_eval();
        self.abort_on_error(result)
    }

    fn abort_on_error(&self, result: Result<StepOutcome>) -> Result<StepOutcome> {
        if let Err(error) = &result {
            if !error.is_secondary() {
                self.transport.abort();
            }
        }
        result
    }

    fn run_peval(&mut self) -> Result<StepOutcome> {
        let program = self.program;
        let fragment = self.fragment;
        let chunk_size = self.chunk_size();
        let mut outbox = Vec::new();
        let mut force_continue = false;
        for range in self.regions() {
            let (region_outbox, region_force) = self.context.par_compute(
                fragment,
                range,
                chunk_size,
                &self.pool,
                |ctx, v, _messages| {
                    let view = VertexView::new(fragment, v);
                    program
                        .init(view, ctx)
                        .and_then(|()| program.compute(Messages::empty(), view, ctx))
                        .map_err(|inner| program_error(fragment, 0, v, inner))
                },
            )?;
            outbox.extend(region_outbox);
            force_continue |= region_force;
        }
        self.finish_round(outbox, force_continue)
    }

    fn run_inc_eval(&mut self) -> Result<StepOutcome> {
        let superstep = self.context.advance_superstep();
        if let Some(max) = self.max_supersteps {
            if superstep >= max {
                return Err(Error::SuperstepLimitExceeded(max));
            }
        }
        let receivers = self.context.begin_round();
        debug!(
            "worker {}: superstep {superstep}, {receivers} vertices received messages, {} halted",
            self.fragment.fid(),
            self.context.halted_count()
        );

        let program = self.program;
        let fragment = self.fragment;
        let chunk_size = self.chunk_size();
        let mut outbox = Vec::new();
        let mut force_continue = false;
        for range in self.regions() {
            let (region_outbox, region_force) = self.context.par_compute(
                fragment,
                range,
                chunk_size,
                &self.pool,
                |ctx, v, messages| {
                    if messages.is_empty() && ctx.is_halted(v)? {
                        return Ok(());
                    }
                    program
                        .compute(Messages::new(messages), VertexView::new(fragment, v), ctx)
                        .map_err(|inner| program_error(fragment, superstep, v, inner))
                },
            )?;
            outbox.extend(region_outbox);
            force_continue |= region_force;
        }
        self.finish_round(outbox, force_continue)
    }

    fn regions(&self) -> Vec<Range<usize>> {
        match self.traversal {
            Traversal::Flat => vec![0..self.fragment.inner_vertices_num()],
            Traversal::ByLabel => (0..self.fragment.vertex_label_num())
                .map(|label| self.fragment.inner_vertices_of_label(label).as_range())
                .collect(),
        }
    }

    fn chunk_size(&self) -> usize {
        self.fragment
            .inner_vertices_num()
            .div_ceil(self.threads * CHUNKS_PER_THREAD)
            .max(1)
    }

    /// Ships messages, synchronizes aggregators and decides termination.
    fn finish_round(
        &mut self,
        outbox: Vec<(Target, MD)>,
        force_continue: bool,
    ) -> Result<StepOutcome> {
        let fid = self.fragment.fid();
        let superstep = self.context.superstep();
        let flushed = self.mailbox.flush(
            self.fragment,
            self.program.combiner(),
            outbox,
            self.context.next_inbox_mut(),
        )?;

        let received = self.transport.exchange(superstep, flushed.batches)?;
        for (from, bytes) in received.iter().enumerate() {
            deliver(self.fragment, from, bytes, self.context.next_inbox_mut())?;
        }
        self.context.clear_inbox();

        let report = RoundReport {
            aggregators: self.context.aggregators().serialize()?,
            all_halted: self.context.all_halted(),
            sent_messages: flushed.sent,
            force_continue,
        };
        let gathered = self
            .transport
            .all_gather(superstep, serialize(&report).map_err(Error::Serialization)?)?;
        let reports = gathered
            .iter()
            .map(|bytes| deserialize::<RoundReport>(bytes).map_err(Error::MalformedMessages))
            .collect::<Result<Vec<_>>>()?;

        let states: Vec<&[u8]> = reports
            .iter()
            .map(|report| report.aggregators.as_slice())
            .collect();
        self.context.aggregators_mut().synchronize(&states)?;

        let sent: u64 = reports.iter().map(|report| report.sent_messages).sum();
        let done = reports
            .iter()
            .all(|report| report.all_halted && report.sent_messages == 0 && !report.force_continue);
        debug!(
            "worker {fid}: superstep {superstep} finished, {} sent locally, {sent} sent globally, done: {done}",
            flushed.sent
        );
        Ok(if done {
            StepOutcome::Done
        } else {
            StepOutcome::Continue
        })
    }
}

fn program_error(
    fragment: &dyn Fragment,
    superstep: u64,
    v: Vertex,
    inner: DynError,
) -> Error {
    Error::VertexProgram {
        superstep,
        vertex: fragment.vertex_to_oid(v),
        inner,
    }
}
