//! Endpoints and the public PUT/GET façade.
//!
//! Three flavors per direction, thin layers over one engine:
//!
//! - `put_nbi`/`get_nbi`: fire and forget. No handle; the pool reclaims the
//!   request at finalization.
//! - `put_nb`/`get_nb`: non-blocking with a completion callback; returns a
//!   releasable handle when the operation stays in flight. Once accepted,
//!   the callback fires exactly once, synchronous outcomes included.
//! - `put`/`get`: blocking, driving worker progress until finalization.
//!
//! PUT additionally tries a SHORT fast path before allocating a request
//! when the whole payload fits the cached inline limit, falling through to
//! the pooled path on lane backpressure.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::slice;

use log::trace;

use crate::error::{Error, Result};
use crate::request::{CompletionCallback, OpKind, Request, RequestFlags, RequestHandle};
use crate::rkey::{RemoteKey, RkeyCache};
use crate::rma::{self, StepOutcome};
use crate::transport::RmaLane;
use crate::worker::WorkerInner;

/// Outcome of a fire-and-forget operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// The transfer finished synchronously; the buffer is reusable.
    Complete,
    /// The transfer is in flight; the buffer must stay valid until the
    /// worker finishes it.
    InProgress,
}

/// Outcome of a callback-notified operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// Finished synchronously; the callback has already fired.
    Complete,
    /// In flight; probe or release through the handle.
    Pending(RequestHandle),
}

pub(crate) struct EndpointInner {
    pub(crate) lanes: Vec<Rc<dyn RmaLane>>,
    pub(crate) rma_lane: Cell<usize>,
    pub(crate) cfg_generation: Cell<u64>,
}

impl EndpointInner {
    pub(crate) fn new(lanes: Vec<Rc<dyn RmaLane>>, rma_lane: usize) -> Self {
        Self {
            lanes,
            rma_lane: Cell::new(rma_lane),
            cfg_generation: Cell::new(0),
        }
    }

    /// Unchecked lane switch; bumps the configuration generation so every
    /// cached key resolution goes stale.
    pub(crate) fn set_rma_lane(&self, lane: usize) {
        self.rma_lane.set(lane);
        self.cfg_generation.set(self.cfg_generation.get() + 1);
    }
}

/// A connection to one remote peer over a set of lanes.
pub struct Endpoint {
    worker: Rc<WorkerInner>,
    inner: Rc<EndpointInner>,
}

impl Endpoint {
    pub(crate) fn new(worker: Rc<WorkerInner>, inner: Rc<EndpointInner>) -> Self {
        Self { worker, inner }
    }

    /// Index of the lane currently used for RMA.
    pub fn rma_lane(&self) -> usize {
        self.inner.rma_lane.get()
    }

    /// Switch RMA traffic to another of this endpoint's lanes.
    ///
    /// Requests already in flight keep their original lane.
    pub fn set_rma_lane(&self, lane: usize) -> Result<()> {
        if lane >= self.inner.lanes.len() {
            return Err(Error::NoLane(lane));
        }
        self.inner.set_rma_lane(lane);
        Ok(())
    }

    /// Write `length` bytes at `buffer` to `remote_addr`, fire and forget.
    ///
    /// `Ok(Complete)` means the buffer is immediately reusable;
    /// `Ok(InProgress)` means it must stay valid until the worker finishes
    /// the transfer (there is no per-operation signal; use [`put_nb`] when
    /// one is needed).
    ///
    /// [`put_nb`]: Endpoint::put_nb
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for `length` bytes for as long as the
    /// transfer is in flight.
    pub unsafe fn put_nbi(
        &self,
        buffer: *const u8,
        length: usize,
        remote_addr: u64,
        rkey: &RemoteKey,
    ) -> Result<OpStatus> {
        trace!("put_nbi len={} remote_addr={:#x}", length, remote_addr);
        if let Some(status) = self.check_params(buffer, length)? {
            return Ok(status);
        }
        let cache = rkey.resolve(&self.inner)?;

        if length <= cache.max_put_short {
            let src = slice::from_raw_parts(buffer, length);
            match self.inner.lanes[cache.lane].put_short(src, remote_addr, cache.lane_rkey) {
                Ok(()) => return Ok(OpStatus::Complete),
                Err(Error::NoResource) => {} // fall through to the pooled path
                Err(e) => return Err(e),
            }
        }

        let id = self.start_request(
            OpKind::Put,
            buffer as *mut u8,
            length,
            remote_addr,
            cache,
            true,
            None,
        )?;
        self.run_new_request_nbi(id)
    }

    /// Write with completion notification.
    ///
    /// Once this returns `Ok`, `callback` fires exactly once with the final
    /// status; `Ok(Complete)` means it already ran, `Ok(Pending)` hands
    /// back a handle to probe with [`Worker::request_status`] and return
    /// with [`Worker::request_release`]. On `Err` the operation never
    /// started and the callback never runs.
    ///
    /// [`Worker::request_status`]: crate::Worker::request_status
    /// [`Worker::request_release`]: crate::Worker::request_release
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for `length` bytes until the callback fires.
    pub unsafe fn put_nb(
        &self,
        buffer: *const u8,
        length: usize,
        remote_addr: u64,
        rkey: &RemoteKey,
        callback: CompletionCallback,
    ) -> Result<Started> {
        trace!("put_nb len={} remote_addr={:#x}", length, remote_addr);
        if self.check_params(buffer, length)?.is_some() {
            callback(Ok(()));
            return Ok(Started::Complete);
        }
        let cache = rkey.resolve(&self.inner)?;

        if length <= cache.max_put_short {
            let src = slice::from_raw_parts(buffer, length);
            match self.inner.lanes[cache.lane].put_short(src, remote_addr, cache.lane_rkey) {
                Ok(()) => {
                    callback(Ok(()));
                    return Ok(Started::Complete);
                }
                Err(Error::NoResource) => {}
                Err(e) => return Err(e),
            }
        }

        let id = self.start_request(
            OpKind::Put,
            buffer as *mut u8,
            length,
            remote_addr,
            cache,
            false,
            Some(callback),
        )?;
        self.run_new_request_nb(id)
    }

    /// Write, blocking until the transfer is complete.
    pub fn put(&self, src: &[u8], remote_addr: u64, rkey: &RemoteKey) -> Result<()> {
        let result: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));
        let slot = result.clone();
        let started = unsafe {
            self.put_nb(
                src.as_ptr(),
                src.len(),
                remote_addr,
                rkey,
                Box::new(move |status| *slot.borrow_mut() = Some(status)),
            )?
        };
        match started {
            Started::Complete => result
                .borrow_mut()
                .take()
                .expect("synchronous completion delivers a status"),
            Started::Pending(handle) => self.wait(handle),
        }
    }

    /// Read `length` bytes from `remote_addr` into `buffer`, fire and
    /// forget. GET has no inline fast path; any nonzero length allocates a
    /// request.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for writes of `length` bytes for as long as
    /// the transfer is in flight.
    pub unsafe fn get_nbi(
        &self,
        buffer: *mut u8,
        length: usize,
        remote_addr: u64,
        rkey: &RemoteKey,
    ) -> Result<OpStatus> {
        trace!("get_nbi len={} remote_addr={:#x}", length, remote_addr);
        if let Some(status) = self.check_params(buffer, length)? {
            return Ok(status);
        }
        let cache = rkey.resolve(&self.inner)?;
        let id = self.start_request(
            OpKind::Get,
            buffer,
            length,
            remote_addr,
            cache,
            true,
            None,
        )?;
        self.run_new_request_nbi(id)
    }

    /// Read with completion notification. Same contract as [`put_nb`].
    ///
    /// [`put_nb`]: Endpoint::put_nb
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for writes of `length` bytes until the
    /// callback fires.
    pub unsafe fn get_nb(
        &self,
        buffer: *mut u8,
        length: usize,
        remote_addr: u64,
        rkey: &RemoteKey,
        callback: CompletionCallback,
    ) -> Result<Started> {
        trace!("get_nb len={} remote_addr={:#x}", length, remote_addr);
        if self.check_params(buffer, length)?.is_some() {
            callback(Ok(()));
            return Ok(Started::Complete);
        }
        let cache = rkey.resolve(&self.inner)?;
        let id = self.start_request(
            OpKind::Get,
            buffer,
            length,
            remote_addr,
            cache,
            false,
            Some(callback),
        )?;
        self.run_new_request_nb(id)
    }

    /// Read, blocking until the transfer is complete.
    pub fn get(&self, dst: &mut [u8], remote_addr: u64, rkey: &RemoteKey) -> Result<()> {
        let result: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));
        let slot = result.clone();
        let started = unsafe {
            self.get_nb(
                dst.as_mut_ptr(),
                dst.len(),
                remote_addr,
                rkey,
                Box::new(move |status| *slot.borrow_mut() = Some(status)),
            )?
        };
        match started {
            Started::Complete => result
                .borrow_mut()
                .take()
                .expect("synchronous completion delivers a status"),
            Started::Pending(handle) => self.wait(handle),
        }
    }

    /// Zero-length and null-pointer screening shared by every entry point.
    /// `Some(Complete)` short-circuits the trivially successful case.
    fn check_params(&self, buffer: *const u8, length: usize) -> Result<Option<OpStatus>> {
        if length == 0 {
            return Ok(Some(OpStatus::Complete));
        }
        if self.worker.config.check_params && buffer.is_null() {
            return Err(Error::InvalidParam("null buffer with nonzero length"));
        }
        Ok(None)
    }

    /// Allocate a pooled request, registering the buffer first when the
    /// transfer can reach the ZCOPY tier. Fails without side effects.
    #[allow(clippy::too_many_arguments)]
    fn start_request(
        &self,
        kind: OpKind,
        buffer: *mut u8,
        length: usize,
        remote_addr: u64,
        cache: RkeyCache,
        auto_release: bool,
        callback: Option<CompletionCallback>,
    ) -> Result<usize> {
        let lane = &self.inner.lanes[cache.lane];
        let caps = lane.caps();
        let registration = if caps.needs_registration(kind, length) {
            Some(lane.register(buffer as u64, length)?)
        } else {
            None
        };

        let mut flags = RequestFlags::empty();
        if auto_release {
            flags.insert(RequestFlags::AUTO_RELEASE);
        }
        let req = Request {
            kind,
            buffer,
            remaining: length,
            remote_addr,
            lane: cache.lane,
            lane_rkey: cache.lane_rkey,
            cfg_generation: cache.cfg_generation,
            caps,
            registration,
            outstanding: 0,
            flags,
            status: None,
            callback,
            endpoint: self.inner.clone(),
        };
        match self.worker.alloc_request(req) {
            Ok(id) => Ok(id),
            Err(e) => {
                if let Some(memh) = registration {
                    lane.deregister(memh);
                }
                Err(e)
            }
        }
    }

    /// Drive a freshly allocated fire-and-forget request. Hard failures
    /// surface as the return status; the pool has already reclaimed the
    /// request either way.
    fn run_new_request_nbi(&self, id: usize) -> Result<OpStatus> {
        match rma::run_request(&self.worker, id) {
            StepOutcome::Done => Ok(OpStatus::Complete),
            StepOutcome::Issued => Ok(OpStatus::InProgress),
            StepOutcome::NoResource => {
                self.worker.push_pending(id);
                Ok(OpStatus::InProgress)
            }
            StepOutcome::Failed(e) => Err(e),
            StepOutcome::More => unreachable!("run_request never yields More"),
        }
    }

    /// Drive a freshly allocated callback-notified request. Terminal
    /// outcomes, success and failure alike, were already delivered through
    /// the callback, so both map to `Complete`.
    fn run_new_request_nb(&self, id: usize) -> Result<Started> {
        match rma::run_request(&self.worker, id) {
            StepOutcome::Done | StepOutcome::Failed(_) => {
                self.worker.release_request(RequestHandle(id));
                Ok(Started::Complete)
            }
            StepOutcome::Issued => Ok(Started::Pending(RequestHandle(id))),
            StepOutcome::NoResource => {
                self.worker.push_pending(id);
                Ok(Started::Pending(RequestHandle(id)))
            }
            StepOutcome::More => unreachable!("run_request never yields More"),
        }
    }

    /// Busy-poll worker progress until `handle` finalizes.
    fn wait(&self, handle: RequestHandle) -> Result<()> {
        loop {
            if let Some(status) = self.worker.request_status(handle) {
                self.worker.release_request(handle);
                return status;
            }
            self.worker.progress();
        }
    }
}
