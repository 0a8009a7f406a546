//! Lane abstraction: the capability-set interface the engine issues
//! fragments through.
//!
//! A lane exposes one method per (operation, mode) pair it supports, plus
//! memory registration and a completion poll. Asynchronous fragments carry a
//! caller-chosen token that comes back in the matching [`Completion`]. Lanes
//! never call back into the worker; the worker polls.

use crate::error::Result;
use crate::lane::LaneCaps;

/// Opaque handle for a lane memory registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemHandle(pub u64);

/// Scatter-gather element over registered memory.
#[derive(Debug, Clone, Copy)]
pub struct Sge {
    /// Local address of the fragment.
    pub addr: u64,
    /// Fragment length in bytes.
    pub len: usize,
    /// Registration covering the fragment.
    pub memh: MemHandle,
}

/// Correlation token for asynchronous fragments.
pub type CompletionToken = u64;

/// Completion event reported by a lane poll.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Token the fragment was issued with.
    pub token: CompletionToken,
    /// Outcome of the fragment.
    pub status: Result<()>,
}

/// Synchronous outcome of issuing an asynchronous-capable fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issued {
    /// The fragment finished inline; no completion event will follow.
    Done,
    /// The fragment is in flight; a completion event will follow.
    Pending,
}

/// Packing callback for BCOPY fragments. Receives the lane's bounce buffer
/// and returns the number of bytes written.
pub type PackFn<'a> = &'a mut dyn FnMut(&mut [u8]) -> usize;

/// A capability-limited communication lane.
///
/// All methods may return [`Error::NoResource`](crate::Error::NoResource)
/// to signal transient backpressure; the engine treats that as "retry the
/// identical fragment later", not as a failure.
pub trait RmaLane {
    /// Capability descriptor for this lane.
    fn caps(&self) -> LaneCaps;

    /// Write `src` to remote memory inline. Completes synchronously.
    fn put_short(&self, src: &[u8], remote_addr: u64, rkey: u64) -> Result<()>;

    /// Write to remote memory through the lane's bounce buffer. The lane
    /// invokes `pack` once to fill the buffer; the returned length is the
    /// number of bytes sent. Completes synchronously from the caller's
    /// perspective (the source buffer is reusable on return).
    fn put_bcopy(&self, pack: PackFn<'_>, remote_addr: u64, rkey: u64) -> Result<usize>;

    /// Write a registered fragment to remote memory, zero copy.
    fn put_zcopy(
        &self,
        sge: Sge,
        remote_addr: u64,
        rkey: u64,
        token: CompletionToken,
    ) -> Result<Issued>;

    /// Read from remote memory into `dst` through the lane's bounce buffer.
    /// Always asynchronous: a completion with `token` follows.
    ///
    /// # Safety
    ///
    /// `dst` must stay valid for `len` bytes until the completion arrives.
    unsafe fn get_bcopy(
        &self,
        dst: *mut u8,
        len: usize,
        remote_addr: u64,
        rkey: u64,
        token: CompletionToken,
    ) -> Result<()>;

    /// Read a registered fragment from remote memory, zero copy.
    fn get_zcopy(
        &self,
        sge: Sge,
        remote_addr: u64,
        rkey: u64,
        token: CompletionToken,
    ) -> Result<Issued>;

    /// Register a local buffer for zero-copy transfers.
    fn register(&self, addr: u64, len: usize) -> Result<MemHandle>;

    /// Release a registration. Idempotence is not required of the lane;
    /// the engine guarantees exactly one call per registration.
    fn deregister(&self, memh: MemHandle);

    /// Drain pending completion events.
    fn poll(&self) -> Vec<Completion>;
}
