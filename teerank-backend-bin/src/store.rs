//! Store contract consumed by the backend
//!
//! Any persistent backend is acceptable; the in-memory implementation below
//! doubles as the default runtime store and the test fake.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use teerank_proto::Snapshot;
use thiserror::Error;
use tracing::debug;

/// Master servers polled when the store lists none and no bootstrap list was
/// configured.
pub const DEFAULT_MASTER_SERVERS: [&str; 4] = [
    "master1.teeworlds.com:8300",
    "master2.teeworlds.com:8300",
    "master3.teeworlds.com:8300",
    "master4.teeworlds.com:8300",
];

/// Elo rating assigned to a player never ranked before.
pub const DEFAULT_ELO: f64 = 1500.0;

/// Transient store failure
///
/// The backend surfaces these in logs and moves on; durability is the
/// store's own responsibility, there is no retry at this layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent state the backend reads and writes
///
/// Elo ratings are keyed by player name and the four combinations of
/// optional game type and optional map, so a player has an overall rating,
/// one per game type, one per map and one per game type and map.
pub trait Store {
    /// Addresses of all known master servers.
    fn list_master_servers(&self) -> Result<Vec<String>, StoreError>;

    /// Addresses of all known game servers.
    fn list_game_servers(&self) -> Result<Vec<String>, StoreError>;

    /// Last saved snapshot of the given game server, if any.
    fn load_game_server(&self, address: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Saves the given game server snapshot.
    fn save_game_server(&mut self, address: &str, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Marks a master server as up, replacing its reported game servers and
    /// clearing its down timestamp.
    fn set_master_server_up(
        &mut self,
        address: &str,
        game_servers: HashSet<String>,
    ) -> Result<(), StoreError>;

    /// Marks a master server as down, keeping the timestamp of the first
    /// failure across subsequent ones.
    fn set_master_server_down(&mut self, address: &str) -> Result<(), StoreError>;

    /// Elo of the given player, defaulting to [`DEFAULT_ELO`].
    fn get_elo(
        &self,
        player: &str,
        game_type: Option<&str>,
        map_name: Option<&str>,
    ) -> Result<f64, StoreError>;

    /// Stores the Elo of the given player.
    fn set_elo(
        &mut self,
        player: &str,
        game_type: Option<&str>,
        map_name: Option<&str>,
        elo: f64,
    ) -> Result<(), StoreError>;
}

/// What the store remembers about one master server
#[derive(Debug, Default, Clone)]
pub struct MasterServerRecord {
    /// When the master stopped answering, `None` while it is up
    pub down_since: Option<SystemTime>,
    /// Game server addresses it reported on its last successful round
    pub game_servers: HashSet<String>,
}

type EloKey = (String, Option<String>, Option<String>);

fn elo_key(player: &str, game_type: Option<&str>, map_name: Option<&str>) -> EloKey {
    (
        player.to_owned(),
        game_type.map(str::to_owned),
        map_name.map(str::to_owned),
    )
}

/// In-memory [`Store`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    game_servers: HashMap<String, Snapshot>,
    master_servers: HashMap<String, MasterServerRecord>,
    elos: HashMap<EloKey, f64>,
}

impl MemoryStore {
    /// Creates an empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of the given master server, if it has ever been polled.
    pub fn master_server(&self, address: &str) -> Option<&MasterServerRecord> {
        self.master_servers.get(address)
    }
}

impl Store for MemoryStore {
    fn list_master_servers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.master_servers.keys().cloned().collect())
    }

    fn list_game_servers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.game_servers.keys().cloned().collect())
    }

    fn load_game_server(&self, address: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.game_servers.get(address).cloned())
    }

    fn save_game_server(&mut self, address: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.game_servers.insert(address.to_owned(), snapshot.clone());
        Ok(())
    }

    fn set_master_server_up(
        &mut self,
        address: &str,
        game_servers: HashSet<String>,
    ) -> Result<(), StoreError> {
        let record = self.master_servers.entry(address.to_owned()).or_default();
        record.down_since = None;
        record.game_servers = game_servers;
        Ok(())
    }

    fn set_master_server_down(&mut self, address: &str) -> Result<(), StoreError> {
        let record = self.master_servers.entry(address.to_owned()).or_default();
        if record.down_since.is_none() {
            record.down_since = Some(SystemTime::now());
        }
        record.game_servers.clear();
        Ok(())
    }

    fn get_elo(
        &self,
        player: &str,
        game_type: Option<&str>,
        map_name: Option<&str>,
    ) -> Result<f64, StoreError> {
        Ok(*self
            .elos
            .get(&elo_key(player, game_type, map_name))
            .unwrap_or(&DEFAULT_ELO))
    }

    fn set_elo(
        &mut self,
        player: &str,
        game_type: Option<&str>,
        map_name: Option<&str>,
        elo: f64,
    ) -> Result<(), StoreError> {
        debug!(player, ?game_type, ?map_name, elo, "new elo");
        self.elos.insert(elo_key(player, game_type, map_name), elo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elo_defaults_to_1500() {
        let store = MemoryStore::new();
        assert_eq!(store.get_elo("tee", None, None).unwrap(), DEFAULT_ELO);
        assert_eq!(
            store.get_elo("tee", Some("CTF"), Some("ctf1")).unwrap(),
            DEFAULT_ELO
        );
    }

    #[test]
    fn test_elo_keys_are_independent() {
        let mut store = MemoryStore::new();

        store.set_elo("tee", Some("CTF"), None, 1600.0).unwrap();

        assert_eq!(store.get_elo("tee", Some("CTF"), None).unwrap(), 1600.0);
        assert_eq!(store.get_elo("tee", None, None).unwrap(), DEFAULT_ELO);
        assert_eq!(
            store.get_elo("tee", Some("CTF"), Some("ctf1")).unwrap(),
            DEFAULT_ELO
        );
        assert_eq!(store.get_elo("another tee", Some("CTF"), None).unwrap(), DEFAULT_ELO);
    }

    #[test]
    fn test_master_server_down_keeps_first_timestamp() {
        let mut store = MemoryStore::new();

        store.set_master_server_down("master1.teeworlds.com:8300").unwrap();
        let first = store
            .master_server("master1.teeworlds.com:8300")
            .unwrap()
            .down_since
            .unwrap();

        store.set_master_server_down("master1.teeworlds.com:8300").unwrap();
        let second = store
            .master_server("master1.teeworlds.com:8300")
            .unwrap()
            .down_since
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_master_server_up_clears_down_since() {
        let mut store = MemoryStore::new();

        store.set_master_server_down("master1.teeworlds.com:8300").unwrap();

        let mut reported = HashSet::new();
        reported.insert("1.2.3.4:8080".to_owned());
        store
            .set_master_server_up("master1.teeworlds.com:8300", reported.clone())
            .unwrap();

        let record = store.master_server("master1.teeworlds.com:8300").unwrap();
        assert_eq!(record.down_since, None);
        assert_eq!(record.game_servers, reported);
    }
}
