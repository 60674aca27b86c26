// Copyright © 2024 Pathway

use std::fmt::Display;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

use log::{error, info};
use scopeguard::{guard, ScopeGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::aggregator::AggregatorRegistry;
use super::config::{Config, Error as ConfigError, JobConfig};
use super::driver::{StepOutcome, SuperstepDriver};
use super::error::{Error, Result};
use super::graph::{Fid, Fragment, Oid};
use super::program::VertexProgram;
use super::transport::{channel_mesh, LocalMessageManager, MessageManager};
use crate::fs_helpers::{ensure_directory, write_atomically};

/// One worker: a fragment, a transport endpoint and the loop driving
/// supersteps until global termination.
pub struct Worker<'a, VD, MD> {
    driver: SuperstepDriver<'a, VD, MD>,
    supersteps: u64,
}

impl<'a, VD, MD> Worker<'a, VD, MD>
where
    VD: Default + Send,
    MD: Serialize + DeserializeOwned + Send,
{
    pub fn new(
        fragment: &'a dyn Fragment,
        program: &'a dyn VertexProgram<VD, MD>,
        transport: Box<dyn MessageManager + 'a>,
        config: &Config,
        job: JobConfig,
    ) -> Result<Self> {
        Ok(Self {
            driver: SuperstepDriver::new(fragment, program, transport, config, job)?,
            supersteps: 0,
        })
    }

    /// Runs PEval and then IncEval until every worker agrees to stop.
    /// Returns the number of executed supersteps.
    pub fn run(&mut self) -> Result<u64> {
        let fid = self.driver.fragment().fid();
        let mut outcome = self.driver.peval()?;
        self.supersteps = 1;
        while outcome == StepOutcome::Continue {
            outcome = self.driver.inc_eval()?;
            self.supersteps += 1;
        }
        info!("worker {fid}: finished after {} supersteps", self.supersteps);
        Ok(self.supersteps)
    }

    pub fn supersteps(&self) -> u64 {
        self.supersteps
    }

    pub fn into_result(self) -> WorkerResult<VD> {
        let fragment = self.driver.fragment();
        let supersteps = self.supersteps;
        let context = self.driver.into_context();
        let aggregators = context.aggregators().clone();
        let mut values: Vec<(Oid, VD)> = fragment
            .inner_vertices()
            .map(|v| fragment.vertex_to_oid(v))
            .zip(context.into_values())
            .collect();
        values.sort_by_key(|(oid, _)| *oid);
        WorkerResult {
            fid: fragment.fid(),
            supersteps,
            values,
            aggregators,
        }
    }
}

/// Final state of one worker.
#[derive(Debug, Clone)]
pub struct WorkerResult<VD> {
    pub fid: Fid,
    pub supersteps: u64,
    /// Values of the owned vertices, sorted by oid.
    pub values: Vec<(Oid, VD)>,
    pub aggregators: AggregatorRegistry,
}

impl<VD> WorkerResult<VD> {
    pub fn value_of(&self, oid: Oid) -> Option<&VD> {
        self.values
            .binary_search_by_key(&oid, |(oid, _)| *oid)
            .ok()
            .map(|index| &self.values[index].1)
    }

    /// Writes `<oid> <value>` lines. The file appears only once complete.
    pub fn write_output(&self, path: &Path) -> Result<()>
    where
        VD: Display,
    {
        write_atomically(path, |writer| {
            for (oid, value) in &self.values {
                writeln!(writer, "{oid} {value}")?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// Writes `result_frag_<fid>` for every worker into `dir`.
pub fn write_outputs<VD: Display>(dir: &Path, results: &[WorkerResult<VD>]) -> Result<Vec<PathBuf>> {
    ensure_directory(dir)?;
    results
        .iter()
        .map(|result| {
            let path = dir.join(format!("result_frag_{}", result.fid));
            result.write_output(&path)?;
            Ok(path)
        })
        .collect()
}

fn check_worker_count(config: &Config, fragments: usize) -> Result<()> {
    if config.workers() == fragments {
        Ok(())
    } else {
        Err(ConfigError::WorkerCountMismatch {
            configured: config.workers(),
            fragments,
        }
        .into())
    }
}

pub fn run_local<VD, MD>(
    fragment: &dyn Fragment,
    program: &dyn VertexProgram<VD, MD>,
    config: &Config,
    job: JobConfig,
) -> Result<WorkerResult<VD>>
where
    VD: Default + Send,
    MD: Serialize + DeserializeOwned + Send,
{
    check_worker_count(config, 1)?;
    if fragment.fid() != 0 || fragment.fnum() != 1 {
        return Err(Error::InvalidFragment(fragment.fid()));
    }
    let mut worker = Worker::new(
        fragment,
        program,
        Box::new(LocalMessageManager::new()),
        config,
        job,
    )?;
    worker.run()?;
    Ok(worker.into_result())
}

/// Runs one thread per fragment; `fragments[i]` must have fid `i`.
///
/// When a worker fails, its peers are aborted and the first failure that
/// is not itself a consequence of an abort is returned.
pub fn run_parallel<VD, MD, F>(
    fragments: &[F],
    program: &dyn VertexProgram<VD, MD>,
    config: &Config,
    job: &JobConfig,
) -> Result<Vec<WorkerResult<VD>>>
where
    VD: Default + Send,
    MD: Serialize + DeserializeOwned + Send,
    F: Fragment,
{
    let fnum = fragments.len();
    check_worker_count(config, fnum)?;
    for (fid, fragment) in fragments.iter().enumerate() {
        if fragment.fid() != fid || fragment.fnum() != fnum {
            return Err(Error::InvalidFragment(fid));
        }
    }
    let (managers, abort) = channel_mesh(fnum)?;
    info!("running {fnum} workers with {} threads each", config.threads());

    let results: Vec<Result<WorkerResult<VD>>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(fnum);
        for (manager, fragment) in managers.into_iter().zip(fragments) {
            let fid = fragment.fid();
            let worker_abort = abort.clone();
            let job = job.clone();
            let spawned = thread::Builder::new()
                .name(format!("pregel:worker-{fid}"))
                .spawn_scoped(scope, move || {
                    let abort_guard = guard(worker_abort, |abort| {
                        error!("worker {fid} failed, aborting the computation");
                        abort.raise();
                    });
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        let mut worker =
                            Worker::new(fragment, program, Box::new(manager), config, job)?;
                        worker.run()?;
                        Ok(worker.into_result())
                    }))
                    .unwrap_or_else(|payload| Err(Error::from_panic_payload(payload)));
                    if result.is_ok() {
                        ScopeGuard::into_inner(abort_guard);
                    }
                    result
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    abort.raise();
                    handles.clear();
                    return vec![Err(Error::Io(e))];
                }
            }
        }
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| Err(Error::from_panic_payload(payload)))
            })
            .collect()
    });

    let mut values = Vec::with_capacity(fnum);
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(result) => values.push(result),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        return Ok(values);
    }
    let root = errors
        .iter()
        .position(|e| !e.is_secondary())
        .unwrap_or_default();
    Err(errors.swap_remove(root))
}
