#![warn(missing_docs)]

//! Protocol datagram "messages" and related types
//!
//! The polling protocol consists of two request messages:
//! 1. the [server list request](Request::ServerList) sent to master servers
//! 2. the [info request](Request::Info) sent to game servers
//!
//! and the replies they elicit:
//! 1. [`lis2`](ServerListReply) from a master server, carrying game server addresses
//! 2. [`inf3` / `dtsf` / `iext` / `iex+`](InfoReply) from a game server, carrying
//!    a [partial snapshot](PartialSnapshot) of its current state
//!
//! A polling round may receive several reply packets for one request;
//! [`PartialSnapshot::merge`] folds them into a single observation.

/// Per-round request token
///
/// Three random bytes generated for every polling round, split between two
/// fields of the info request and reconstructed from a scrambled echo in the
/// reply. Tokens are for packet correlation only, not authentication, but the
/// source must be non-predictable across rounds so a stale packet cannot
/// poison a new round.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Token(pub [u8; 3]);

impl Token {
    /// The all-zero token, used before any round has started.
    pub const ZERO: Token = Token([0; 3]);
}

impl<I: std::slice::SliceIndex<[u8]>> std::ops::Index<I> for Token {
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        std::ops::Index::index(&self.0, index)
    }
}

/// Snapshot-quality tier determined by which reply variant a server speaks
///
/// Strictly ordered: a higher capability supersedes a lower one when merging
/// reply packets, and the learned capability of a server drives which request
/// variant is sent on the next round.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Capability {
    /// Never observed; both request variants are sent
    Unknown,
    /// `inf3` replies, at most 16 clients
    Vanilla,
    /// `dtsf` replies, up to 64 clients
    Legacy64,
    /// `iext` / `iex+` replies
    Extended,
}

impl Default for Capability {
    fn default() -> Self {
        Capability::Unknown
    }
}

/// Request variant tag of an info request
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RequestVariant {
    /// `gie3`, answered by vanilla and extended servers
    Vanilla,
    /// `fstd`, answered by legacy-64 servers
    Legacy64,
}

impl RequestVariant {
    /// Returns the 4-byte wire tag of this variant.
    pub fn tag(self) -> &'static [u8; 4] {
        match self {
            RequestVariant::Vanilla => b"gie3",
            RequestVariant::Legacy64 => b"fstd",
        }
    }
}

/// A request packet to send to a server
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Request {
    /// `req2`, asks a master server for its game server list
    ServerList,
    /// `gie3` / `fstd`, asks a game server for its current state
    Info {
        /// Which request variant to send
        variant: RequestVariant,
        /// The token for this polling round
        token: Token,
    },
}

/// General information block of a game server snapshot
///
/// The `flags` wire field, and `map_crc` / `map_size` on the extended wire,
/// are consumed during parsing but not retained.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ServerInfo {
    /// Game version string
    pub version: String,
    /// Server name as shown in the browser
    pub name: String,
    /// Current map
    pub map_name: String,
    /// Current game type (`CTF`, `DM`, ...)
    pub game_type: String,
    /// Clients currently playing
    pub num_players: i32,
    /// Player slots
    pub max_players: i32,
    /// Clients connected, spectators included
    pub num_clients: i32,
    /// Client slots
    pub max_clients: i32,
}

/// One connected client in a game server snapshot
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Client {
    /// Player name; identity key within a snapshot, duplicates can occur
    pub name: String,
    /// Clan tag, `None` when the wire field is empty
    pub clan: Option<String>,
    /// Country code; `-1` when unset on the extended wire
    pub country: i32,
    /// Current score
    pub score: i32,
    /// Whether the client is playing rather than spectating
    pub ingame: bool,
}

/// State accumulated from the reply packets of one polling round
///
/// Clients keep their positional identity: packets append, they never replace
/// by name, so two `(connecting)` clients both survive.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PartialSnapshot {
    /// Best capability seen so far this round
    pub capability: Capability,
    /// Info block, absent until a complete-info packet arrives
    pub info: Option<ServerInfo>,
    /// Clients in arrival order
    pub clients: Vec<Client>,
}

impl PartialSnapshot {
    /// Folds another reply packet into this accumulated state.
    ///
    /// A strictly better capability replaces the whole accumulation, an equal
    /// one contributes additively, a worse one is discarded.
    pub fn merge(&mut self, other: PartialSnapshot) {
        use std::cmp::Ordering;

        match other.capability.cmp(&self.capability) {
            Ordering::Greater => *self = other,
            Ordering::Equal => {
                self.clients.extend(other.clients);
                if other.info.is_some() {
                    self.info = other.info;
                }
            }
            Ordering::Less => {}
        }
    }

    /// Completes the round, returning a snapshot iff every client announced
    /// by the info block has been received.
    pub fn finish(self) -> Option<Snapshot> {
        let info = self.info?;

        if info.num_clients < 0 || self.clients.len() != info.num_clients as usize {
            return None;
        }

        Some(Snapshot {
            capability: self.capability,
            info,
            clients: self.clients,
        })
    }
}

/// A complete observation of a game server
///
/// Invariant: `clients.len() == info.num_clients`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Snapshot {
    /// Which reply variant produced this snapshot
    pub capability: Capability,
    /// Info block
    pub info: ServerInfo,
    /// Clients in arrival order
    pub clients: Vec<Client>,
}

/// `inf3` / `dtsf` / `iext` / `iex+` reply from a game server
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InfoReply {
    tag: [u8; 4],
    token: Token,
    snapshot: PartialSnapshot,
}

impl InfoReply {
    /// Creates a new `InfoReply` for the given wire tag, recovered token and
    /// partial snapshot.
    pub fn new(tag: [u8; 4], token: Token, snapshot: PartialSnapshot) -> Self {
        Self {
            tag,
            token,
            snapshot,
        }
    }

    /// Returns the wire tag this reply arrived with.
    pub fn tag(&self) -> [u8; 4] {
        self.tag
    }

    /// Returns the token recovered from the scrambled echo.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Consumes the reply, returning the partial snapshot it carried.
    pub fn into_snapshot(self) -> PartialSnapshot {
        self.snapshot
    }
}

/// `lis2` reply from a master server
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ServerListReply {
    servers: Vec<std::net::SocketAddr>,
}

impl ServerListReply {
    /// Creates a new `ServerListReply` for the given server addresses.
    pub fn new(servers: Vec<std::net::SocketAddr>) -> Self {
        Self { servers }
    }

    /// Returns the game server addresses contained in this reply.
    pub fn servers(&self) -> &[std::net::SocketAddr] {
        &self.servers[..]
    }
}

/// Any reply packet a polled server can send back
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Reply {
    /// Reply from a master server
    ServerList(ServerListReply),
    /// Reply from a game server
    Info(InfoReply),
}

impl Reply {
    /// Returns the 4-byte wire tag this reply arrived with.
    pub fn tag(&self) -> [u8; 4] {
        match self {
            Reply::ServerList(_) => *b"lis2",
            Reply::Info(info) => info.tag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(name: &str) -> Client {
        Client {
            name: name.to_owned(),
            clan: None,
            country: -1,
            score: 0,
            ingame: true,
        }
    }

    fn info(num_clients: i32) -> ServerInfo {
        ServerInfo {
            version: "0.6.4".to_owned(),
            name: "test server".to_owned(),
            map_name: "ctf1".to_owned(),
            game_type: "CTF".to_owned(),
            num_players: num_clients,
            max_players: 16,
            num_clients,
            max_clients: 16,
        }
    }

    #[test]
    fn test_merge_higher_capability_replaces() {
        let mut accumulated = PartialSnapshot {
            capability: Capability::Vanilla,
            info: Some(info(2)),
            clients: vec![client("a"), client("b")],
        };

        accumulated.merge(PartialSnapshot {
            capability: Capability::Extended,
            info: Some(info(1)),
            clients: vec![client("c")],
        });

        assert_eq!(accumulated.capability, Capability::Extended);
        assert_eq!(accumulated.clients.len(), 1);
        assert_eq!(accumulated.clients[0].name, "c");
    }

    #[test]
    fn test_merge_equal_capability_appends() {
        let mut accumulated = PartialSnapshot {
            capability: Capability::Extended,
            info: Some(info(4)),
            clients: vec![client("a"), client("b")],
        };

        accumulated.merge(PartialSnapshot {
            capability: Capability::Extended,
            info: None,
            clients: vec![client("c"), client("a")],
        });

        assert_eq!(accumulated.capability, Capability::Extended);
        assert!(accumulated.info.is_some());
        let names: Vec<&str> = accumulated.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "a"]);
    }

    #[test]
    fn test_merge_lower_capability_discarded() {
        let mut accumulated = PartialSnapshot {
            capability: Capability::Legacy64,
            info: Some(info(1)),
            clients: vec![client("a")],
        };

        accumulated.merge(PartialSnapshot {
            capability: Capability::Vanilla,
            info: Some(info(2)),
            clients: vec![client("b"), client("c")],
        });

        assert_eq!(accumulated.capability, Capability::Legacy64);
        assert_eq!(accumulated.clients.len(), 1);
    }

    #[test]
    fn test_merge_keeps_max_capability() {
        for &(left, right) in &[
            (Capability::Unknown, Capability::Vanilla),
            (Capability::Vanilla, Capability::Legacy64),
            (Capability::Extended, Capability::Legacy64),
        ] {
            let mut accumulated = PartialSnapshot {
                capability: left,
                ..PartialSnapshot::default()
            };
            accumulated.merge(PartialSnapshot {
                capability: right,
                ..PartialSnapshot::default()
            });
            assert_eq!(accumulated.capability, left.max(right));
        }
    }

    #[test]
    fn test_finish_complete() {
        let snapshot = PartialSnapshot {
            capability: Capability::Vanilla,
            info: Some(info(2)),
            clients: vec![client("a"), client("b")],
        };

        let snapshot = snapshot.finish().unwrap();
        assert_eq!(snapshot.clients.len(), snapshot.info.num_clients as usize);
    }

    #[test]
    fn test_finish_incomplete() {
        let missing_clients = PartialSnapshot {
            capability: Capability::Vanilla,
            info: Some(info(3)),
            clients: vec![client("a")],
        };
        assert_eq!(missing_clients.finish(), None);

        let missing_info = PartialSnapshot {
            capability: Capability::Extended,
            info: None,
            clients: vec![client("a")],
        };
        assert_eq!(missing_info.finish(), None);
    }
}
