//! `atoll-demo` — driver program for the atoll primitives.
//!
//! Not part of any library contract; it exercises the public operations
//! and prints what they return.
//!
//! # Usage
//!
//! ```text
//! atoll-demo ring                              # route demo keys on A/B/C
//! atoll-demo ring -n db1:2 -n db2 -k user:42   # weighted nodes, own keys
//! atoll-demo replicate                         # two-node HLC replication
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use atoll_clock::{adjusted_time, time_left, ClockConfig, HlcClock, Timestamp};
use atoll_kv::{LwwStore, VersionedValue};
use atoll_ring::HashRing;
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::info;

#[derive(Parser)]
#[command(name = "atoll-demo", version, about = "Atoll primitives demo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route keys on a weighted consistent-hash ring.
    Ring {
        /// Node to place on the ring, as `NAME` or `NAME:WEIGHT`.
        /// Repeatable; defaults to A, B, C with weight 1.
        #[arg(short, long = "node")]
        nodes: Vec<String>,

        /// Key to route. Repeatable; defaults to user:1..user:3.
        #[arg(short, long = "key")]
        keys: Vec<String>,

        /// Replica count to request per key.
        #[arg(short, long, default_value = "2")]
        replicas: usize,

        /// Virtual points per unit of node weight.
        #[arg(long, default_value = "100")]
        vnodes: u32,
    },

    /// Replicate conflicting writes between two in-process nodes using
    /// HLC timestamps and a last-writer-wins store.
    Replicate {
        /// Maximum tolerated local clock drift in milliseconds.
        #[arg(long, default_value = "5")]
        max_drift_ms: i64,
    },
}

fn main() -> Result<()> {
    setup_tracing();

    match Cli::parse().command {
        Commands::Ring {
            nodes,
            keys,
            replicas,
            vnodes,
        } => cmd_ring(nodes, keys, replicas, vnodes),
        Commands::Replicate { max_drift_ms } => cmd_replicate(max_drift_ms),
    }
}

/// Initialize the `tracing` subscriber, respecting `RUST_LOG` if set.
fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// atoll-demo ring
// -----------------------------------------------------------------------

fn cmd_ring(nodes: Vec<String>, keys: Vec<String>, replicas: usize, vnodes: u32) -> Result<()> {
    let nodes = if nodes.is_empty() {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    } else {
        nodes
    };
    let keys = if keys.is_empty() {
        (1..=3).map(|i| format!("user:{i}")).collect()
    } else {
        keys
    };

    let ring: HashRing<String> = HashRing::with_config(atoll_ring::Crc32Hasher, vnodes);
    for spec in &nodes {
        let (name, weight) = parse_node_spec(spec)?;
        ring.add_node_weighted(name.to_string(), weight);
    }
    info!(
        nodes = ring.node_count(),
        vnodes = ring.vnode_count(),
        "ring built"
    );

    for key in &keys {
        let primary = ring.get_node(key).context("ring is empty")?;
        println!("{key} -> {primary}");
        println!("{key} replicas -> {:?}", ring.get_nodes(key, replicas));
    }

    // Show minimal remapping: drop the first node and route again.
    let (first, _) = parse_node_spec(&nodes[0])?;
    ring.remove_node(&first.to_string());
    println!("\nafter removing {first}:");
    for key in &keys {
        match ring.get_node(key) {
            Some(primary) => println!("{key} -> {primary}"),
            None => println!("{key} -> (ring is empty)"),
        }
    }

    Ok(())
}

/// Parse `NAME` or `NAME:WEIGHT`.
fn parse_node_spec(spec: &str) -> Result<(&str, u32)> {
    match spec.split_once(':') {
        None => Ok((spec, 1)),
        Some((name, weight)) => {
            if name.is_empty() {
                bail!("empty node name in spec {spec:?}");
            }
            let weight = weight
                .parse()
                .with_context(|| format!("bad weight in node spec {spec:?}"))?;
            Ok((name, weight))
        }
    }
}

// -----------------------------------------------------------------------
// atoll-demo replicate
// -----------------------------------------------------------------------

/// One simulated cluster member: a clock, a store, and an ID.
struct DemoNode {
    id: &'static str,
    clock: HlcClock,
    store: LwwStore,
}

impl DemoNode {
    fn new(id: &'static str, max_drift_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            id,
            clock: HlcClock::new(ClockConfig { max_drift_ms }),
            store: LwwStore::new(),
        })
    }

    /// Write locally and replicate to `peer` over a simulated link with a
    /// random 10-60 ms round trip.
    fn put(self: &Arc<Self>, peer: &Arc<Self>, key: &str, data: &str) -> thread::JoinHandle<()> {
        let ts = self.clock.now();
        self.store.apply(
            key,
            VersionedValue {
                data: data.to_string(),
                ts,
            },
        );
        info!(node = self.id, key, data, "local write");

        let peer = Arc::clone(peer);
        let key = key.to_string();
        let data = data.to_string();
        thread::spawn(move || {
            let rtt_ms = rand::rng().random_range(10..=60);
            thread::sleep(Duration::from_millis(rtt_ms));
            peer.receive(&key, &data, ts, rtt_ms as i64);
        })
    }

    /// Apply a replicated write from a peer.
    fn receive(&self, key: &str, data: &str, ts: Timestamp, rtt_ms: i64) {
        self.clock.update(ts, rtt_ms);
        self.store.apply(
            key,
            VersionedValue {
                data: data.to_string(),
                ts,
            },
        );
        info!(node = self.id, key, data, rtt_ms, "replicated write");
    }
}

fn cmd_replicate(max_drift_ms: i64) -> Result<()> {
    let node_a = DemoNode::new("A", max_drift_ms);
    let node_b = DemoNode::new("B", max_drift_ms);

    // A server-side deadline one minute out, as both nodes estimate it
    // over a 25 ms round trip.
    let deadline = {
        let mut ts = node_a.clock.now();
        ts.physical_ms += 60_000;
        ts
    };
    let rtt_ms = 25;
    println!(
        "deadline at {} (adjusted server time {})",
        deadline.physical_ms,
        adjusted_time(node_a.clock.now(), rtt_ms)
    );
    println!(
        "time left: A={}ms B={}ms",
        time_left(deadline, node_a.clock.now(), rtt_ms),
        time_left(deadline, node_b.clock.now(), rtt_ms),
    );

    // Conflicting concurrent writes to the same key, replicated both ways.
    let sends = [
        node_a.put(&node_b, "user:1", "alice"),
        node_b.put(&node_a, "user:1", "bob"),
    ];
    for send in sends {
        send.join().expect("replication thread panicked");
    }

    println!("\nfinal state after replication:");
    for node in [&node_a, &node_b] {
        let value = node.store.get("user:1").context("key missing")?;
        println!(
            "node {} sees user:1 = {:?} at {} +-{}ms (logical {})",
            node.id,
            value.data,
            value.ts.physical_ms,
            value.ts.uncertainty_ms,
            value.ts.logical,
        );
    }

    Ok(())
}
