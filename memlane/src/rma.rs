//! The RMA fragmentation engine.
//!
//! One fragment is issued per progress invocation. `remaining` is debited
//! optimistically at issuance, including for asynchronous fragments, so
//! `remaining == 0` means "everything issued", not "everything done";
//! finalization additionally waits for `outstanding == 0`. All
//! registration release and completion notification flows through
//! [`finalize`], which a `COMPLETED` flag makes single-shot.
//!
//! Borrow discipline: request state is snapshotted under the pool borrow,
//! the borrow is dropped before touching the lane, and the lane result is
//! folded back in under a fresh borrow. Completion callbacks run with no
//! borrows held, so they may start new operations.

use std::ptr;
use std::slice;

use log::trace;

use crate::error::{Error, Result};
use crate::lane::TransferMode;
use crate::request::{OpKind, RequestFlags};
use crate::transport::{CompletionToken, Issued, Sge};
use crate::worker::WorkerInner;

/// Outcome of one engine step on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// The request finalized successfully.
    Done,
    /// A fragment was issued and more bytes remain.
    More,
    /// Everything is issued; completions are still in flight.
    Issued,
    /// The lane had no resources; request state is untouched.
    NoResource,
    /// The request finalized with an error.
    Failed(Error),
}

/// Issue fragments until the request leaves the More state.
pub(crate) fn run_request(w: &WorkerInner, id: usize) -> StepOutcome {
    loop {
        match progress(w, id) {
            StepOutcome::More => continue,
            other => return other,
        }
    }
}

/// Issue at most one fragment for the request.
pub(crate) fn progress(w: &WorkerInner, id: usize) -> StepOutcome {
    let (kind, buffer, remaining, remote_addr, lane_rkey, caps, memh, lane) = {
        let requests = w.requests.borrow();
        let req = match requests.get(id) {
            Some(req) => req,
            None => return StepOutcome::Issued,
        };
        if req.flags.contains(RequestFlags::COMPLETED) {
            // Finalized while parked on the pending list, e.g. by an error
            // completion. Nothing left to issue.
            return StepOutcome::Issued;
        }
        if req.remaining == 0 {
            // Already fully issued; waiting on completions.
            return StepOutcome::Issued;
        }
        // While the configuration that created this request is current, its
        // lane must still be the endpoint's configured RMA lane.
        debug_assert!(
            req.cfg_generation != req.endpoint.cfg_generation.get()
                || req.lane == req.endpoint.rma_lane.get()
        );
        (
            req.kind,
            req.buffer,
            req.remaining,
            req.remote_addr,
            req.lane_rkey,
            req.caps,
            req.registration,
            req.endpoint.lanes[req.lane].clone(),
        )
    };

    let token = id as CompletionToken;
    let res = match kind {
        OpKind::Put => {
            let (mode, frag) = caps.select_put(remaining);
            match mode {
                TransferMode::Short => {
                    let src = unsafe { slice::from_raw_parts(buffer, frag) };
                    lane.put_short(src, remote_addr, lane_rkey)
                        .map(|()| (frag, Issued::Done))
                }
                TransferMode::Bcopy => {
                    let mut pack = |dst: &mut [u8]| {
                        let n = frag.min(dst.len());
                        unsafe { ptr::copy_nonoverlapping(buffer, dst.as_mut_ptr(), n) };
                        n
                    };
                    lane.put_bcopy(&mut pack, remote_addr, lane_rkey)
                        .map(|sent| (sent, Issued::Done))
                }
                TransferMode::Zcopy => {
                    // Registration happened at creation; mode selection on
                    // total length guarantees it exists here.
                    let memh = memh.expect("zcopy fragment without registration");
                    let sge = Sge {
                        addr: buffer as u64,
                        len: frag,
                        memh,
                    };
                    lane.put_zcopy(sge, remote_addr, lane_rkey, token)
                        .map(|issued| (frag, issued))
                }
            }
        }
        OpKind::Get => {
            let (mode, frag) = caps.select_get(remaining);
            match mode {
                TransferMode::Short => unreachable!("no short tier for get"),
                TransferMode::Bcopy => unsafe {
                    lane.get_bcopy(buffer, frag, remote_addr, lane_rkey, token)
                        .map(|()| (frag, Issued::Pending))
                },
                TransferMode::Zcopy => {
                    let memh = memh.expect("zcopy fragment without registration");
                    let sge = Sge {
                        addr: buffer as u64,
                        len: frag,
                        memh,
                    };
                    lane.get_zcopy(sge, remote_addr, lane_rkey, token)
                        .map(|issued| (frag, issued))
                }
            }
        }
    };

    request_advance(w, id, res)
}

/// Fold one fragment's issue result back into the request.
pub(crate) fn request_advance(
    w: &WorkerInner,
    id: usize,
    res: Result<(usize, Issued)>,
) -> StepOutcome {
    let (frag, issued) = match res {
        Ok(v) => v,
        Err(Error::NoResource) => return StepOutcome::NoResource,
        Err(e) => {
            finalize(w, id, Err(e.clone()));
            return StepOutcome::Failed(e);
        }
    };

    let fully_issued = {
        let mut requests = w.requests.borrow_mut();
        let req = requests
            .get_mut(id)
            .expect("advancing a released request");
        if issued == Issued::Pending {
            req.outstanding += 1;
        }
        debug_assert!(frag <= req.remaining);
        req.remaining -= frag;
        if req.remaining == 0 {
            Some(req.outstanding == 0)
        } else {
            req.buffer = unsafe { req.buffer.add(frag) };
            req.remote_addr += frag as u64;
            None
        }
    };

    match fully_issued {
        Some(true) => {
            finalize(w, id, Ok(()));
            StepOutcome::Done
        }
        Some(false) => StepOutcome::Issued,
        None => StepOutcome::More,
    }
}

/// Deliver one lane completion event to its request.
///
/// Tokens whose request is unknown are ignored; the pool never reuses a
/// slot while events for its previous occupant can still arrive.
pub(crate) fn handle_completion(w: &WorkerInner, token: CompletionToken, status: Result<()>) {
    let id = token as usize;
    let action = {
        let mut requests = w.requests.borrow_mut();
        let req = match requests.get_mut(id) {
            Some(req) => req,
            None => return,
        };
        debug_assert!(req.outstanding > 0);
        req.outstanding -= 1;
        if status.is_err() {
            Some(status)
        } else if !req.flags.contains(RequestFlags::COMPLETED)
            && req.remaining == 0
            && req.outstanding == 0
        {
            Some(Ok(()))
        } else {
            None
        }
    };

    if let Some(status) = action {
        finalize(w, id, status);
    }
    // Covers stragglers whose request already finalized: finalize bails on
    // the COMPLETED flag without reaching its own reclaim.
    try_reclaim(w, id);
}

/// Single funnel for request completion: releases the registration and
/// fires the callback, each exactly once, then reclaims the slot when the
/// request is releasable and quiescent.
pub(crate) fn finalize(w: &WorkerInner, id: usize, status: Result<()>) {
    let (registration, callback, lane) = {
        let mut requests = w.requests.borrow_mut();
        let req = match requests.get_mut(id) {
            Some(req) => req,
            None => return,
        };
        if req.flags.contains(RequestFlags::COMPLETED) {
            return;
        }
        req.flags.insert(RequestFlags::COMPLETED);
        req.status = Some(status.clone());
        (
            req.registration.take(),
            req.callback.take(),
            req.endpoint.lanes[req.lane].clone(),
        )
    };

    trace!("request {} finalized: {:?}", id, status);
    if let Some(memh) = registration {
        lane.deregister(memh);
    }
    if let Some(cb) = callback {
        cb(status);
    }
    try_reclaim(w, id);
}

/// Free the pool slot once the request is completed, releasable, and has no
/// outstanding fragments.
pub(crate) fn try_reclaim(w: &WorkerInner, id: usize) {
    let mut requests = w.requests.borrow_mut();
    if requests.get(id).is_some_and(|req| req.reclaimable()) {
        requests.remove(id);
    }
}
