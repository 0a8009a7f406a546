//! Pooled request state.
//!
//! Requests live in the worker's slab and are only ever manipulated through
//! the engine in `rma.rs`. The slot is reclaimed when the request is
//! completed, releasable, and has no outstanding fragments; the last
//! condition keeps a slot from being reused while a stale completion token
//! could still arrive for it.

use std::rc::Rc;

use bitflags::bitflags;

use crate::endpoint::EndpointInner;
use crate::error::Result;
use crate::lane::LaneCaps;
use crate::transport::MemHandle;

bitflags! {
    /// Request lifecycle flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RequestFlags: u8 {
        /// The pool reclaims the slot at finalization; the caller holds no
        /// handle to this request.
        const AUTO_RELEASE = 1 << 0;
        /// Finalization already ran. Deregistration and the completion
        /// callback never run twice.
        const COMPLETED = 1 << 1;
    }
}

/// Operation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Put,
    Get,
}

/// Handle to a pooled request, valid until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHandle(pub(crate) usize);

/// Completion callback for non-blocking operations with notification.
pub type CompletionCallback = Box<dyn FnOnce(Result<()>)>;

/// Per-operation transfer state.
pub(crate) struct Request {
    pub(crate) kind: OpKind,
    /// Cursor into the caller's buffer; advances as fragments are issued.
    pub(crate) buffer: *mut u8,
    /// Bytes not yet issued. Decreases monotonically to exactly zero.
    pub(crate) remaining: usize,
    /// Remote cursor; advances in lockstep with `buffer`.
    pub(crate) remote_addr: u64,
    /// Lane index resolved at creation.
    pub(crate) lane: usize,
    /// Lane-level key resolved at creation.
    pub(crate) lane_rkey: u64,
    /// Endpoint configuration generation the resolution belongs to.
    pub(crate) cfg_generation: u64,
    /// Capability snapshot of the resolved lane.
    pub(crate) caps: LaneCaps,
    /// Registration acquired at creation when the transfer can reach the
    /// ZCOPY tier. Released exactly once at finalization.
    pub(crate) registration: Option<MemHandle>,
    /// Fragments issued asynchronously and not yet completed.
    pub(crate) outstanding: u32,
    pub(crate) flags: RequestFlags,
    /// Final status, set at finalization.
    pub(crate) status: Option<Result<()>>,
    pub(crate) callback: Option<CompletionCallback>,
    pub(crate) endpoint: Rc<EndpointInner>,
}

impl Request {
    /// Whether the pool may reclaim this slot.
    pub(crate) fn reclaimable(&self) -> bool {
        self.flags
            .contains(RequestFlags::COMPLETED | RequestFlags::AUTO_RELEASE)
            && self.outstanding == 0
    }
}
