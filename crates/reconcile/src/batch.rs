//! Batch planning - reconciles many independent objects in parallel

use crate::engine;
use crate::error::Result;
use crate::operation::UpdateOperation;
use crate::schema::ObjectSchema;
use crate::value::{DeclaredObject, ObservedObject, Origin};
use log::debug;
use rayon::prelude::*;

/// One object to plan
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    /// Name used in progress output and logs
    pub label: &'a str,
    pub schema: &'a ObjectSchema,
    pub declared: &'a DeclaredObject,
    pub observed: &'a ObservedObject,
    pub origin: Origin,
}

impl PlanRequest<'_> {
    pub fn plan(&self) -> Result<UpdateOperation> {
        engine::plan(self.schema, self.declared, self.observed, self.origin)
    }
}

/// Receives progress while a batch is planned
///
/// Called from worker threads, so implementations must be `Sync`.
pub trait BatchObserver: Sync {
    /// Called once before any object is planned
    fn on_start(&self, _total: usize) {}

    /// Called as each object finishes, in completion order
    fn on_planned(&self, _label: &str, _result: &Result<UpdateOperation>) {}

    /// Called once after every object is planned
    fn on_finish(&self) {}
}

/// Observer that ignores everything
pub struct Silent;

impl BatchObserver for Silent {}

/// Plan every request using up to `jobs` worker threads
///
/// Results come back in request order. A rejected object does not stop the
/// others; only a failure to build the worker pool is an outer error.
pub fn plan_batch(
    requests: &[PlanRequest<'_>],
    jobs: usize,
) -> Result<Vec<Result<UpdateOperation>>> {
    plan_batch_with(requests, jobs, &Silent)
}

/// [`plan_batch`] reporting progress to `observer`
pub fn plan_batch_with<O: BatchObserver>(
    requests: &[PlanRequest<'_>],
    jobs: usize,
    observer: &O,
) -> Result<Vec<Result<UpdateOperation>>> {
    observer.on_start(requests.len());

    let plan_one = |request: &PlanRequest<'_>| {
        let result = request.plan();
        observer.on_planned(request.label, &result);
        result
    };

    let results: Vec<Result<UpdateOperation>> = if jobs <= 1 || requests.len() <= 1 {
        debug!("planning {} object(s) sequentially", requests.len());
        requests.iter().map(plan_one).collect()
    } else {
        debug!("planning {} object(s) on {jobs} threads", requests.len());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
        pool.install(|| requests.par_iter().map(plan_one).collect())
    };

    observer.on_finish();
    Ok(results)
}
