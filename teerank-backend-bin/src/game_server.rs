//! Game server polling state machine
//!
//! One round: generate a token, send the request variants the learned
//! capability calls for, merge whatever reply packets come back, and close
//! with a completeness check that drives ranking and persistence.

use std::net::SocketAddr;

use rand::Rng;
use teerank_proto::{
    Capability, InfoReply, PartialSnapshot, ProtocolError, Request, RequestVariant, Snapshot, Token,
};
use tracing::info;

use crate::rank::rank;
use crate::store::{Store, StoreError};

pub struct GameServer {
    address: String,
    socket_address: SocketAddr,
    /// Last complete observation, kept to drive the ranking pass.
    snapshot: Option<Snapshot>,
    /// Token of the current round.
    token: Token,
    /// State accumulated from the current round's reply packets.
    round: PartialSnapshot,
}

impl GameServer {
    /// A game server never seen before, typically fresh out of a master
    /// server listing. Game server addresses are already numeric.
    pub fn new(socket_address: SocketAddr) -> Self {
        Self::with_snapshot(socket_address, None)
    }

    /// A game server with its last snapshot as loaded from the store.
    pub fn with_snapshot(socket_address: SocketAddr, snapshot: Option<Snapshot>) -> Self {
        Self {
            address: socket_address.to_string(),
            socket_address,
            snapshot,
            token: Token::ZERO,
            round: PartialSnapshot::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn socket_address(&self) -> SocketAddr {
        self.socket_address
    }

    /// Capability learned from the last complete snapshot.
    fn capability(&self) -> Capability {
        self.snapshot
            .as_ref()
            .map_or(Capability::Unknown, |snapshot| snapshot.capability)
    }

    pub fn start_polling(&mut self) -> Vec<Request> {
        let capability = self.capability();

        // Legacy servers echo only the first token byte correctly, so only
        // extended servers get a full 3-byte token.
        self.token = if capability == Capability::Extended {
            Token(rand::thread_rng().gen())
        } else {
            Token([rand::thread_rng().gen(), 0, 0])
        };

        self.round = PartialSnapshot::default();

        // Pick the request variant the server is known to answer, or send
        // both while its capability is still unknown.
        let mut requests = Vec::new();

        if capability != Capability::Legacy64 {
            requests.push(Request::Info {
                variant: RequestVariant::Vanilla,
                token: self.token,
            });
        }
        if capability == Capability::Unknown || capability == Capability::Legacy64 {
            requests.push(Request::Info {
                variant: RequestVariant::Legacy64,
                token: self.token,
            });
        }

        requests
    }

    pub fn process_packet(&mut self, reply: InfoReply) -> Result<(), ProtocolError> {
        if reply.token() != self.token {
            return Err(ProtocolError::WrongToken);
        }

        self.round.merge(reply.into_snapshot());

        Ok(())
    }

    /// Closes the round. On a complete accumulation, ranks players against
    /// the previous snapshot and persists the new one; at most one save per
    /// round.
    pub fn stop_polling<S: Store>(&mut self, store: &mut S) -> Result<bool, StoreError> {
        let snapshot = match std::mem::take(&mut self.round).finish() {
            Some(snapshot) => snapshot,
            None => return Ok(false),
        };

        rank(store, self.snapshot.as_ref(), &snapshot)?;
        store.save_game_server(&self.address, &snapshot)?;

        info!(
            server = %self.address,
            "updated: {} on {} ({}/{} clients)",
            snapshot.info.game_type,
            snapshot.info.map_name,
            snapshot.info.num_clients,
            snapshot.info.max_clients,
        );

        self.snapshot = Some(snapshot);

        Ok(true)
    }
}
