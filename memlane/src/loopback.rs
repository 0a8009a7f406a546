//! In-process loopback lane.
//!
//! Backs "remote" memory with an owned segment in the same address space.
//! Data moves synchronously at issue time, but zero-copy fragments and
//! BCOPY gets still report through completion events on the next `poll`,
//! so the asynchronous half of the engine is exercised for real. Used by
//! the integration tests and the bench binary.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ptr;

use crate::error::{Error, Result};
use crate::lane::LaneCaps;
use crate::transport::{Completion, CompletionToken, Issued, MemHandle, PackFn, RmaLane, Sge};

/// Loopback lane over an owned memory segment.
pub struct LoopbackLane {
    caps: LaneCaps,
    segment: RefCell<Box<[u8]>>,
    events: RefCell<VecDeque<Completion>>,
    next_memh: Cell<u64>,
    active_registrations: Cell<usize>,
    total_registrations: Cell<usize>,
}

impl LoopbackLane {
    /// Create a lane backed by a zeroed segment of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::with_caps(size, LaneCaps::default())
    }

    /// Create a lane with explicit capability limits.
    pub fn with_caps(size: usize, caps: LaneCaps) -> Self {
        Self {
            caps,
            segment: RefCell::new(vec![0u8; size].into_boxed_slice()),
            events: RefCell::new(VecDeque::new()),
            next_memh: Cell::new(1),
            active_registrations: Cell::new(0),
            total_registrations: Cell::new(0),
        }
    }

    /// Base address of the segment; valid remote addresses are
    /// `base_addr() .. base_addr() + size`.
    pub fn base_addr(&self) -> u64 {
        self.segment.borrow().as_ptr() as u64
    }

    /// Registrations currently held. Zero once every transfer finalized.
    pub fn active_registrations(&self) -> usize {
        self.active_registrations.get()
    }

    /// Registrations ever made.
    pub fn total_registrations(&self) -> usize {
        self.total_registrations.get()
    }

    /// Snapshot of the segment, for asserting transfer contents.
    pub fn segment_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        self.segment.borrow()[offset..offset + len].to_vec()
    }

    /// Write into the segment directly, priming data for GETs.
    pub fn fill_segment(&self, offset: usize, data: &[u8]) {
        self.segment.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
    }

    fn offset_of(&self, remote_addr: u64, len: usize) -> Result<usize> {
        let base = self.base_addr();
        let end = base + self.segment.borrow().len() as u64;
        if remote_addr < base || remote_addr + len as u64 > end {
            return Err(Error::Transport(format!(
                "remote range {:#x}+{} outside segment",
                remote_addr, len
            )));
        }
        Ok((remote_addr - base) as usize)
    }

    fn complete_later(&self, token: CompletionToken) {
        self.events.borrow_mut().push_back(Completion {
            token,
            status: Ok(()),
        });
    }
}

impl RmaLane for LoopbackLane {
    fn caps(&self) -> LaneCaps {
        self.caps
    }

    fn put_short(&self, src: &[u8], remote_addr: u64, _rkey: u64) -> Result<()> {
        let off = self.offset_of(remote_addr, src.len())?;
        self.segment.borrow_mut()[off..off + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn put_bcopy(&self, pack: PackFn<'_>, remote_addr: u64, _rkey: u64) -> Result<usize> {
        let mut bounce = vec![0u8; self.caps.max_put_bcopy];
        let n = pack(&mut bounce);
        let off = self.offset_of(remote_addr, n)?;
        self.segment.borrow_mut()[off..off + n].copy_from_slice(&bounce[..n]);
        Ok(n)
    }

    fn put_zcopy(
        &self,
        sge: Sge,
        remote_addr: u64,
        _rkey: u64,
        token: CompletionToken,
    ) -> Result<Issued> {
        let off = self.offset_of(remote_addr, sge.len)?;
        {
            let mut segment = self.segment.borrow_mut();
            unsafe {
                ptr::copy_nonoverlapping(
                    sge.addr as *const u8,
                    segment[off..].as_mut_ptr(),
                    sge.len,
                );
            }
        }
        self.complete_later(token);
        Ok(Issued::Pending)
    }

    unsafe fn get_bcopy(
        &self,
        dst: *mut u8,
        len: usize,
        remote_addr: u64,
        _rkey: u64,
        token: CompletionToken,
    ) -> Result<()> {
        let off = self.offset_of(remote_addr, len)?;
        {
            let segment = self.segment.borrow();
            ptr::copy_nonoverlapping(segment[off..].as_ptr(), dst, len);
        }
        self.complete_later(token);
        Ok(())
    }

    fn get_zcopy(
        &self,
        sge: Sge,
        remote_addr: u64,
        _rkey: u64,
        token: CompletionToken,
    ) -> Result<Issued> {
        let off = self.offset_of(remote_addr, sge.len)?;
        {
            let segment = self.segment.borrow();
            unsafe {
                ptr::copy_nonoverlapping(segment[off..].as_ptr(), sge.addr as *mut u8, sge.len);
            }
        }
        self.complete_later(token);
        Ok(Issued::Pending)
    }

    fn register(&self, _addr: u64, _len: usize) -> Result<MemHandle> {
        let id = self.next_memh.get();
        self.next_memh.set(id + 1);
        self.active_registrations
            .set(self.active_registrations.get() + 1);
        self.total_registrations
            .set(self.total_registrations.get() + 1);
        Ok(MemHandle(id))
    }

    fn deregister(&self, _memh: MemHandle) {
        let active = self.active_registrations.get();
        assert!(active > 0, "deregister without matching register");
        self.active_registrations.set(active - 1);
    }

    fn poll(&self) -> Vec<Completion> {
        self.events.borrow_mut().drain(..).collect()
    }
}
