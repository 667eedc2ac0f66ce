//! Uniform polling contract over the two server kinds
//!
//! The pool drives every server through the same three operations:
//! `start_polling` producing request packets, `process_packet` for each
//! reply routed to it, and `stop_polling` to close the round.

use std::net::SocketAddr;

use teerank_proto::{ProtocolError, Reply, Request};

use crate::game_server::GameServer;
use crate::master_server::MasterServer;
use crate::store::{Store, StoreError};

/// A server the pool knows how to poll
pub enum Server {
    Master(MasterServer),
    Game(GameServer),
}

impl Server {
    /// Textual address, the store key.
    pub fn address(&self) -> &str {
        match self {
            Server::Master(master) => master.address(),
            Server::Game(game) => game.address(),
        }
    }

    /// Numeric address packets are sent to and received from.
    pub fn socket_address(&self) -> SocketAddr {
        match self {
            Server::Master(master) => master.socket_address(),
            Server::Game(game) => game.socket_address(),
        }
    }

    pub fn start_polling(&mut self) -> Vec<Request> {
        match self {
            Server::Master(master) => master.start_polling(),
            Server::Game(game) => game.start_polling(),
        }
    }

    /// Routes a decoded reply to its owner. A reply of the wrong kind for
    /// this server is dropped like any unknown variant tag.
    pub fn process_packet(&mut self, reply: Reply) -> Result<(), ProtocolError> {
        match (self, reply) {
            (Server::Game(game), Reply::Info(reply)) => game.process_packet(reply),
            (Server::Master(master), Reply::ServerList(reply)) => {
                master.process_packet(&reply);
                Ok(())
            }
            (_, reply) => Err(ProtocolError::UnsupportedVariant(reply.tag())),
        }
    }

    pub fn stop_polling<S: Store>(&mut self, store: &mut S) -> Result<bool, StoreError> {
        match self {
            Server::Master(master) => master.stop_polling(store),
            Server::Game(game) => game.stop_polling(store),
        }
    }
}
