//! Worker: request pool, pending-retry list, and the progress driver.
//!
//! The worker is single threaded (`Rc`-based, `!Send`); exclusive access to
//! the pool and the lanes is a compile-time invariant, not a lock. Callers
//! drive everything by calling [`Worker::progress`] in their event loop.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use slab::Slab;

use crate::config::{EndpointConfig, WorkerConfig};
use crate::endpoint::{Endpoint, EndpointInner};
use crate::error::{Error, Result};
use crate::request::{Request, RequestFlags, RequestHandle};
use crate::rma::{self, StepOutcome};
use crate::transport::RmaLane;

pub(crate) struct WorkerInner {
    pub(crate) config: WorkerConfig,
    pub(crate) requests: RefCell<Slab<Request>>,
    /// Requests frozen on lane backpressure, retried on the next progress.
    pub(crate) pending: RefCell<Vec<usize>>,
    /// Every distinct lane of every endpoint; polled for completions.
    pub(crate) lanes: RefCell<Vec<Rc<dyn RmaLane>>>,
}

impl WorkerInner {
    /// Insert a request into the pool, enforcing the configured cap.
    pub(crate) fn alloc_request(&self, req: Request) -> Result<usize> {
        let mut requests = self.requests.borrow_mut();
        if requests.len() >= self.config.max_requests {
            return Err(Error::PoolExhausted);
        }
        Ok(requests.insert(req))
    }

    pub(crate) fn push_pending(&self, id: usize) {
        self.pending.borrow_mut().push(id);
    }

    /// One progress pass: drain lane completions, then retry requests
    /// frozen on backpressure.
    pub(crate) fn progress(&self) -> usize {
        let mut count = 0;

        let lanes: Vec<Rc<dyn RmaLane>> = self.lanes.borrow().clone();
        for lane in &lanes {
            for completion in lane.poll() {
                rma::handle_completion(self, completion.token, completion.status);
                count += 1;
            }
        }

        let pending = mem::take(&mut *self.pending.borrow_mut());
        for id in pending {
            match rma::run_request(self, id) {
                StepOutcome::NoResource => self.push_pending(id),
                _ => count += 1,
            }
        }

        count
    }

    pub(crate) fn request_status(&self, handle: RequestHandle) -> Option<Result<()>> {
        self.requests
            .borrow()
            .get(handle.0)
            .and_then(|req| req.status.clone())
    }

    pub(crate) fn release_request(&self, handle: RequestHandle) {
        {
            let mut requests = self.requests.borrow_mut();
            if let Some(req) = requests.get_mut(handle.0) {
                req.flags.insert(RequestFlags::AUTO_RELEASE);
            }
        }
        rma::try_reclaim(self, handle.0);
    }
}

/// Progress engine owning the request pool.
pub struct Worker {
    inner: Rc<WorkerInner>,
}

impl Worker {
    /// Create a worker.
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            inner: Rc::new(WorkerInner {
                config,
                requests: RefCell::new(Slab::new()),
                pending: RefCell::new(Vec::new()),
                lanes: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create an endpoint over `lanes`.
    ///
    /// The configured RMA lane index must name one of `lanes`.
    pub fn create_endpoint(
        &self,
        lanes: Vec<Rc<dyn RmaLane>>,
        config: &EndpointConfig,
    ) -> Result<Endpoint> {
        if config.rma_lane >= lanes.len() {
            return Err(Error::NoLane(config.rma_lane));
        }
        {
            let mut registry = self.inner.lanes.borrow_mut();
            for lane in &lanes {
                if !registry.iter().any(|l| Rc::ptr_eq(l, lane)) {
                    registry.push(lane.clone());
                }
            }
        }
        Ok(Endpoint::new(
            self.inner.clone(),
            Rc::new(EndpointInner::new(lanes, config.rma_lane)),
        ))
    }

    /// Run one progress pass. Returns the number of completion events
    /// handled plus retried requests that made progress.
    pub fn progress(&self) -> usize {
        self.inner.progress()
    }

    /// Final status of a pooled request, or `None` while it is in flight.
    pub fn request_status(&self, handle: RequestHandle) -> Option<Result<()>> {
        self.inner.request_status(handle)
    }

    /// Return a request handle to the pool. The slot is reclaimed as soon
    /// as the request is complete and quiescent.
    pub fn request_release(&self, handle: RequestHandle) {
        self.inner.release_request(handle)
    }

    /// Number of requests currently pooled.
    pub fn active_requests(&self) -> usize {
        self.inner.requests.borrow().len()
    }
}
