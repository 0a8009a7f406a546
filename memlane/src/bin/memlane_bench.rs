//! PUT/GET throughput and latency benchmark over the loopback lane.
//!
//! Run with:
//! ```bash
//! cargo run --release -p memlane --bin memlane_bench --features bench-bin -- \
//!     -i 100000 -s 64,4096,262144 -w 10000
//! ```

use std::rc::Rc;
use std::time::Instant;

use clap::Parser;

use memlane::{
    EndpointConfig, LoopbackLane, RemoteKey, RmaLane, Worker, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "memlane_bench")]
#[command(about = "PUT/GET benchmark over the loopback lane")]
struct Args {
    /// Number of iterations per run
    #[arg(short, long, default_value = "100000")]
    iterations: u64,

    /// Message sizes (comma-separated)
    #[arg(short = 's', long, value_delimiter = ',', default_value = "64,4096,262144")]
    message_sizes: Vec<usize>,

    /// Number of warmup iterations
    #[arg(short, long, default_value = "10000")]
    warmup: u64,

    /// Loopback segment size
    #[arg(long, default_value = "4194304")]
    segment_size: usize,
}

struct RunResult {
    size: usize,
    avg_us: f64,
    mops: f64,
    gbps: f64,
}

fn run_put(
    ep: &memlane::Endpoint,
    rkey: &RemoteKey,
    remote_base: u64,
    size: usize,
    iterations: u64,
) -> RunResult {
    let payload = vec![0x5au8; size];
    let start = Instant::now();
    for _ in 0..iterations {
        ep.put(&payload, remote_base, rkey).expect("put failed");
    }
    let elapsed = start.elapsed();
    let avg_us = elapsed.as_secs_f64() * 1e6 / iterations as f64;
    RunResult {
        size,
        avg_us,
        mops: iterations as f64 / elapsed.as_secs_f64() / 1e6,
        gbps: (iterations as f64 * size as f64 * 8.0) / elapsed.as_secs_f64() / 1e9,
    }
}

fn run_get(
    ep: &memlane::Endpoint,
    rkey: &RemoteKey,
    remote_base: u64,
    size: usize,
    iterations: u64,
) -> RunResult {
    let mut buf = vec![0u8; size];
    let start = Instant::now();
    for _ in 0..iterations {
        ep.get(&mut buf, remote_base, rkey).expect("get failed");
    }
    let elapsed = start.elapsed();
    let avg_us = elapsed.as_secs_f64() * 1e6 / iterations as f64;
    RunResult {
        size,
        avg_us,
        mops: iterations as f64 / elapsed.as_secs_f64() / 1e6,
        gbps: (iterations as f64 * size as f64 * 8.0) / elapsed.as_secs_f64() / 1e9,
    }
}

fn main() {
    let args = Args::parse();

    let worker = Worker::new(WorkerConfig::default());
    let lane = Rc::new(LoopbackLane::new(args.segment_size));
    let remote_base = lane.base_addr();
    let ep = worker
        .create_endpoint(
            vec![lane.clone() as Rc<dyn RmaLane>],
            &EndpointConfig::default(),
        )
        .expect("endpoint creation failed");
    let rkey = RemoteKey::new(0);

    eprintln!(
        "{:<6} {:>10} {:>12} {:>10} {:>10}",
        "op", "size", "avg_us", "Mops", "Gbps"
    );
    for &size in &args.message_sizes {
        assert!(
            size <= args.segment_size,
            "message size {} exceeds segment size {}",
            size,
            args.segment_size
        );
        run_put(&ep, &rkey, remote_base, size, args.warmup);
        let put = run_put(&ep, &rkey, remote_base, size, args.iterations);
        eprintln!(
            "{:<6} {:>10} {:>12.3} {:>10.3} {:>10.3}",
            "put", put.size, put.avg_us, put.mops, put.gbps
        );

        run_get(&ep, &rkey, remote_base, size, args.warmup);
        let get = run_get(&ep, &rkey, remote_base, size, args.iterations);
        eprintln!(
            "{:<6} {:>10} {:>12.3} {:>10.3} {:>10.3}",
            "get", get.size, get.avg_us, get.mops, get.gbps
        );
    }
}
