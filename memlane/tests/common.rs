//! Common test utilities for memlane integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use memlane::{
    Completion, CompletionToken, Error, Issued, LaneCaps, MemHandle, PackFn, Result, RmaLane, Sge,
};

/// Which lane method a fragment went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragOp {
    PutShort,
    PutBcopy,
    PutZcopy,
    GetBcopy,
    GetZcopy,
}

/// One recorded issue attempt, including attempts the script rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragRecord {
    pub op: FragOp,
    pub remote_addr: u64,
    pub len: usize,
}

/// Scriptable lane that records every issue attempt and only completes
/// asynchronous fragments when the test says so.
///
/// `force` queues outcomes consumed by issue calls in order; an empty queue
/// means success. Asynchronous fragments park their token until
/// `complete_next`/`fail_next` moves it into the event queue drained by the
/// next `poll`.
pub struct MockLane {
    caps: LaneCaps,
    records: RefCell<Vec<FragRecord>>,
    forced: RefCell<VecDeque<Result<()>>>,
    forced_register: RefCell<VecDeque<Result<()>>>,
    pending: RefCell<VecDeque<CompletionToken>>,
    events: RefCell<VecDeque<Completion>>,
    active_registrations: Cell<usize>,
    total_registrations: Cell<usize>,
}

impl MockLane {
    pub fn new(caps: LaneCaps) -> Rc<Self> {
        Rc::new(Self {
            caps,
            records: RefCell::new(Vec::new()),
            forced: RefCell::new(VecDeque::new()),
            forced_register: RefCell::new(VecDeque::new()),
            pending: RefCell::new(VecDeque::new()),
            events: RefCell::new(VecDeque::new()),
            active_registrations: Cell::new(0),
            total_registrations: Cell::new(0),
        })
    }

    /// Capability set used by most tests: SHORT up to 256, BCOPY fragments
    /// of 4 KiB, ZCOPY from 64 KiB in 256 KiB fragments.
    pub fn test_caps() -> LaneCaps {
        LaneCaps {
            max_put_short: 256,
            max_put_bcopy: 4096,
            max_put_zcopy: 256 << 10,
            max_get_bcopy: 4096,
            max_get_zcopy: 256 << 10,
            short_thresh: 256,
            put_zcopy_thresh: 64 << 10,
            get_zcopy_thresh: 64 << 10,
        }
    }

    /// Queue an outcome for the next issue attempt.
    pub fn force(&self, outcome: Result<()>) {
        self.forced.borrow_mut().push_back(outcome);
    }

    /// Queue an outcome for the next registration attempt.
    pub fn force_register(&self, outcome: Result<()>) {
        self.forced_register.borrow_mut().push_back(outcome);
    }

    /// Every issue attempt so far, in order.
    pub fn records(&self) -> Vec<FragRecord> {
        self.records.borrow().clone()
    }

    /// Tokens issued asynchronously and not yet completed.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Complete the oldest pending fragment successfully; the event is
    /// delivered on the next `poll`.
    pub fn complete_next(&self) {
        let token = self
            .pending
            .borrow_mut()
            .pop_front()
            .expect("no pending fragment to complete");
        self.events.borrow_mut().push_back(Completion {
            token,
            status: Ok(()),
        });
    }

    /// Fail the oldest pending fragment.
    pub fn fail_next(&self, err: Error) {
        let token = self
            .pending
            .borrow_mut()
            .pop_front()
            .expect("no pending fragment to fail");
        self.events.borrow_mut().push_back(Completion {
            token,
            status: Err(err),
        });
    }

    pub fn active_registrations(&self) -> usize {
        self.active_registrations.get()
    }

    pub fn total_registrations(&self) -> usize {
        self.total_registrations.get()
    }

    fn record(&self, op: FragOp, remote_addr: u64, len: usize) {
        self.records.borrow_mut().push(FragRecord {
            op,
            remote_addr,
            len,
        });
    }

    fn forced_outcome(&self) -> Result<()> {
        self.forced.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

impl RmaLane for MockLane {
    fn caps(&self) -> LaneCaps {
        self.caps
    }

    fn put_short(&self, src: &[u8], remote_addr: u64, _rkey: u64) -> Result<()> {
        self.record(FragOp::PutShort, remote_addr, src.len());
        self.forced_outcome()
    }

    fn put_bcopy(&self, pack: PackFn<'_>, remote_addr: u64, _rkey: u64) -> Result<usize> {
        let mut bounce = vec![0u8; self.caps.max_put_bcopy];
        let n = pack(&mut bounce);
        self.record(FragOp::PutBcopy, remote_addr, n);
        self.forced_outcome().map(|()| n)
    }

    fn put_zcopy(
        &self,
        sge: Sge,
        remote_addr: u64,
        _rkey: u64,
        token: CompletionToken,
    ) -> Result<Issued> {
        self.record(FragOp::PutZcopy, remote_addr, sge.len);
        self.forced_outcome()?;
        self.pending.borrow_mut().push_back(token);
        Ok(Issued::Pending)
    }

    unsafe fn get_bcopy(
        &self,
        _dst: *mut u8,
        len: usize,
        remote_addr: u64,
        _rkey: u64,
        token: CompletionToken,
    ) -> Result<()> {
        self.record(FragOp::GetBcopy, remote_addr, len);
        self.forced_outcome()?;
        self.pending.borrow_mut().push_back(token);
        Ok(())
    }

    fn get_zcopy(
        &self,
        sge: Sge,
        remote_addr: u64,
        _rkey: u64,
        token: CompletionToken,
    ) -> Result<Issued> {
        self.record(FragOp::GetZcopy, remote_addr, sge.len);
        self.forced_outcome()?;
        self.pending.borrow_mut().push_back(token);
        Ok(Issued::Pending)
    }

    fn register(&self, _addr: u64, _len: usize) -> Result<MemHandle> {
        if let Some(outcome) = self.forced_register.borrow_mut().pop_front() {
            outcome?;
        }
        let id = self.total_registrations.get() as u64 + 1;
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
