//! memlane - RMA PUT/GET transfer engine over capability-limited lanes.
//!
//! Moves arbitrarily large buffers between a local buffer and remote
//! memory (named by a virtual address plus an opaque [`RemoteKey`]) across
//! transports whose single-operation size is bounded. Each fragment goes
//! out in the cheapest mode the lane and the remaining length permit:
//!
//! - **SHORT**: inline with the descriptor, synchronous
//! - **BCOPY**: staged through a lane bounce buffer
//! - **ZCOPY**: DMA'd directly from/to the registered caller buffer
//!
//! # Architecture
//!
//! ```text
//! put/get ─► Endpoint façade ─► fast path (SHORT, no request)
//!                │                  │ backpressure
//!                ▼                  ▼
//!           Worker pool ──► fragmentation engine ──► RmaLane
//!           (slab slots)    one fragment per step     │
//!                ▲                                    │
//!                └──── progress(): completions ◄──────┘
//! ```
//!
//! Lane backpressure is never an error: a request that cannot issue its
//! next fragment freezes and retries the identical fragment on a later
//! [`Worker::progress`] pass. Buffer deregistration and completion
//! notification happen exactly once per request, on every path.
//!
//! The worker is single threaded by construction (`Rc`-based handles are
//! `!Send`); drive it from one event loop.
//!
//! # Usage
//!
//! ```
//! use std::rc::Rc;
//! use memlane::{
//!     EndpointConfig, LoopbackLane, RemoteKey, RmaLane, Worker, WorkerConfig,
//! };
//!
//! let worker = Worker::new(WorkerConfig::default());
//! let lane = Rc::new(LoopbackLane::new(1 << 20));
//! let remote_base = lane.base_addr();
//! let ep = worker
//!     .create_endpoint(vec![lane.clone() as Rc<dyn RmaLane>], &EndpointConfig::default())
//!     .unwrap();
//!
//! let rkey = RemoteKey::new(0);
//! let payload = vec![7u8; 128 << 10];
//! ep.put(&payload, remote_base, &rkey).unwrap();
//!
//! let mut readback = vec![0u8; payload.len()];
//! ep.get(&mut readback, remote_base, &rkey).unwrap();
//! assert_eq!(readback, payload);
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod lane;
pub mod loopback;
pub mod rkey;
pub mod transport;

mod request;
mod rma;
mod worker;

pub use config::{EndpointConfig, WorkerConfig};
pub use endpoint::{Endpoint, OpStatus, Started};
pub use error::{Error, Result};
pub use lane::{LaneCaps, TransferMode};
pub use loopback::LoopbackLane;
pub use request::{CompletionCallback, OpKind, RequestHandle};
pub use rkey::RemoteKey;
pub use transport::{Completion, CompletionToken, Issued, MemHandle, PackFn, RmaLane, Sge};
pub use worker::Worker;
