//! Master server polling state machine

use std::net::SocketAddr;

use indexmap::IndexSet;
use teerank_proto::{Request, ServerListReply};

use crate::store::{Store, StoreError};

pub struct MasterServer {
    /// Textual address, possibly a DNS name; the store key.
    address: String,
    socket_address: SocketAddr,
    /// Packets received this round.
    packet_count: u32,
    /// Game server addresses reported this round, in arrival order.
    game_servers: IndexSet<String>,
}

impl MasterServer {
    /// Creates a master server from its textual address and the socket
    /// address it resolved to.
    pub fn new(address: String, socket_address: SocketAddr) -> Self {
        Self {
            address,
            socket_address,
            packet_count: 0,
            game_servers: IndexSet::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn socket_address(&self) -> SocketAddr {
        self.socket_address
    }

    pub fn start_polling(&mut self) -> Vec<Request> {
        self.packet_count = 0;
        self.game_servers.clear();

        vec![Request::ServerList]
    }

    pub fn process_packet(&mut self, reply: &ServerListReply) {
        for &server in reply.servers() {
            // Masters occasionally list themselves; that is not a game
            // server.
            if server != self.socket_address {
                self.game_servers.insert(server.to_string());
            }
        }

        self.packet_count += 1;
    }

    /// Closes the round. There is no reliable way to know when all packets
    /// have been received, so one packet makes the round a success.
    pub fn stop_polling<S: Store>(&mut self, store: &mut S) -> Result<bool, StoreError> {
        if self.packet_count > 0 {
            store.set_master_server_up(
                &self.address,
                self.game_servers.iter().cloned().collect(),
            )?;
            Ok(true)
        } else {
            store.set_master_server_down(&self.address)?;
            Ok(false)
        }
    }

    /// Game server addresses reported by the last round.
    pub fn game_servers(&self) -> impl Iterator<Item = &str> {
        self.game_servers.iter().map(|address| address.as_str())
    }
}
