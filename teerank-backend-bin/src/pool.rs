//! Polling engine: scheduling, batching, retries
//!
//! A single owner drives everything: a heap of entries ordered by due time,
//! the in-flight batch keyed by source address, and the address index used
//! by discovery. The driver calls `route` for each inbound datagram, then
//! `close_rounds`, then sends whatever `start_batch` hands back, roughly
//! once per second.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::mem;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::Rng;
use teerank_proto::{Reply, Request};
use tracing::{debug, info, warn};

use crate::game_server::GameServer;
use crate::server::Server;
use crate::store::Store;

/// Time between two polls of the same server.
pub const POLL_DELAY: Duration = Duration::from_secs(3 * 60);

/// Maximum number of packets sent per tick, to bound packet loss under
/// bursty schedules.
const MAX_PACKETS_PER_TICK: usize = 25;

/// Number of consecutive poll failures after which a server is removed.
const MAX_POLL_FAILURE: u32 = 3;

struct Entry {
    server: Server,
    due_at: Instant,
    failures: u32,
    /// Insertion sequence, the tie-breaker for equal due times.
    seq: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, the earliest entry must win.
        (other.due_at, other.seq).cmp(&(self.due_at, self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

pub struct ServerPool<S> {
    entries: BinaryHeap<Entry>,
    /// Addresses currently in the pool, in `entries` or in `batch`.
    index: HashSet<String>,
    /// Entries awaiting replies this round, keyed by source address.
    batch: HashMap<SocketAddr, Entry>,
    store: S,
    seq: u64,
}

impl<S: Store> ServerPool<S> {
    pub fn new(store: S) -> Self {
        Self {
            entries: BinaryHeap::new(),
            index: HashSet::new(),
            batch: HashMap::new(),
            store,
            seq: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the given address is already in the pool.
    pub fn contains(&self, address: &str) -> bool {
        self.index.contains(address)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Adds a server to the pool with a randomized first due time, so that
    /// a freshly loaded population spreads evenly over the poll window.
    pub fn add(&mut self, server: Server, now: Instant) {
        info!(server = %server.address(), "adding server");

        let jitter = Duration::from_secs(rand::thread_rng().gen_range(0..POLL_DELAY.as_secs()));

        self.index.insert(server.address().to_owned());
        self.seq += 1;
        self.entries.push(Entry {
            server,
            due_at: now + jitter,
            failures: 0,
            seq: self.seq,
        });
    }

    /// Routes one inbound datagram to the batch entry owning its source
    /// address. Protocol errors drop the packet, nothing else.
    pub fn route(&mut self, from: SocketAddr, reply: Reply) {
        match self.batch.get_mut(&from) {
            Some(entry) => {
                if let Err(error) = entry.server.process_packet(reply) {
                    info!(server = %entry.server.address(), "dropping packet: {}", error);
                }
            }
            // A reply from a closed round, or an unsolicited datagram.
            None => debug!(%from, "dropping packet from unknown source"),
        }
    }

    /// Closes the round for every entry in the batch: reschedule on
    /// success, count failures and evict on the threshold otherwise, and
    /// admit the game servers a successful master round discovered.
    pub fn close_rounds(&mut self, now: Instant) {
        let batch = mem::take(&mut self.batch);
        let mut discovered: Vec<SocketAddr> = Vec::new();

        for (_, mut entry) in batch {
            let success = match entry.server.stop_polling(&mut self.store) {
                Ok(success) => success,
                Err(error) => {
                    // The round itself went through; only persistence
                    // failed. The store owns its durability.
                    warn!(server = %entry.server.address(), "store failure: {}", error);
                    true
                }
            };

            if success {
                entry.failures = 0;
                entry.due_at += POLL_DELAY;

                if let Server::Master(master) = &entry.server {
                    for address in master.game_servers() {
                        if !self.index.contains(address) {
                            match address.parse() {
                                Ok(socket_address) => discovered.push(socket_address),
                                Err(_) => debug!(%address, "ignoring unparseable address"),
                            }
                        }
                    }
                }
            } else {
                entry.failures += 1;

                if entry.failures == MAX_POLL_FAILURE {
                    info!(server = %entry.server.address(), "removing server");
                    self.index.remove(entry.server.address());
                    continue;
                }

                // Retried at its old due time; the initial jitter keeps the
                // population spread.
            }

            self.entries.push(entry);
        }

        for socket_address in discovered {
            if !self.contains(&socket_address.to_string()) {
                self.add(Server::Game(GameServer::new(socket_address)), now);
            }
        }
    }

    /// Starts the next batch: pops due entries until the heap head is not
    /// due yet or the packet budget for this tick is spent, and returns the
    /// request packets for the driver to send.
    pub fn start_batch(&mut self, now: Instant) -> Vec<(Request, SocketAddr)> {
        let mut sent = Vec::new();

        while sent.len() < MAX_PACKETS_PER_TICK {
            match self.entries.peek() {
                Some(entry) if entry.due_at <= now => {}
                _ => break,
            }

            let mut entry = match self.entries.pop() {
                Some(entry) => entry,
                None => break,
            };

            let socket_address = entry.server.socket_address();
            for request in entry.server.start_polling() {
                sent.push((request, socket_address));
            }

            self.batch.insert(socket_address, entry);
        }

        sent
    }
}
