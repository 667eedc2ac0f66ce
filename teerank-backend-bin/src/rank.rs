//! Elo ranking of players between two successive server snapshots

use std::collections::HashMap;

use teerank_proto::Snapshot;

use crate::store::{Store, StoreError};

/// Game types players are ranked on.
const RANKED_GAME_TYPES: [&str; 3] = ["CTF", "DM", "TDM"];

const ELO_K: f64 = 25.0;

/// Classic Elo formula for two players; returns the rating delta of the
/// first player, the second one gets its negation.
fn elo_delta(score1: i64, elo1: f64, score2: i64, elo2: f64) -> f64 {
    let result = if score1 < score2 {
        0.0
    } else if score1 == score2 {
        0.5
    } else {
        1.0
    };

    let diff = (elo1 - elo2).clamp(-400.0, 400.0);
    let expected = 1.0 / (1.0 + f64::powf(10.0, -diff / 400.0));

    ELO_K * (result - expected)
}

/// Ranks players given the old and new state of a game server.
///
/// Players are matched pairwise on their score difference between the two
/// snapshots; the average rating delta over all matches is added to each
/// player's Elo, independently for every combination of optional game type
/// and optional map. Returns whether any ranking took place.
pub fn rank<S: Store>(
    store: &mut S,
    old: Option<&Snapshot>,
    new: &Snapshot,
) -> Result<bool, StoreError> {
    let old = match old {
        Some(old) => old,
        None => return Ok(false),
    };

    if !RANKED_GAME_TYPES.contains(&new.info.game_type.as_str()) {
        return Ok(false);
    }

    // If the game type or the map changed, it makes no sense to compare the
    // two snapshots.
    if old.info.game_type != new.info.game_type || old.info.map_name != new.info.map_name {
        return Ok(false);
    }

    // Players in game in both snapshots. Intersection is by name: a
    // duplicated name ("(connecting)" twice) counts as one subject, and the
    // last occurrence wins.
    let old_scores: HashMap<&str, i64> = old
        .clients
        .iter()
        .filter(|client| client.ingame)
        .map(|client| (client.name.as_str(), client.score as i64))
        .collect();
    let new_scores: HashMap<&str, i64> = new
        .clients
        .iter()
        .filter(|client| client.ingame)
        .map(|client| (client.name.as_str(), client.score as i64))
        .collect();

    let mut names: Vec<&str> = Vec::new();
    for client in new.clients.iter().filter(|client| client.ingame) {
        let name = client.name.as_str();
        if old_scores.contains_key(name) && !names.contains(&name) {
            names.push(name);
        }
    }

    if names.len() < 2 {
        return Ok(false);
    }

    // Player score is the difference between old and new score. A
    // non-positive aggregate means a new game most likely started in
    // between, in which case the deltas are meaningless.
    let scores: Vec<i64> = names
        .iter()
        .map(|name| new_scores[name] - old_scores[name])
        .collect();

    if scores.iter().sum::<i64>() <= 0 {
        return Ok(false);
    }

    let game_type = new.info.game_type.as_str();
    let map_name = new.info.map_name.as_str();

    for &(game_type, map_name) in &[
        (Some(game_type), Some(map_name)),
        (Some(game_type), None),
        (None, Some(map_name)),
        (None, None),
    ] {
        let mut elos = Vec::with_capacity(names.len());
        for name in &names {
            elos.push(store.get_elo(name, game_type, map_name)?);
        }

        let mut deltas = vec![0.0; names.len()];

        for i in 0..names.len() {
            for j in i + 1..names.len() {
                let delta = elo_delta(scores[i], elos[i], scores[j], elos[j]);
                deltas[i] += delta;
                deltas[j] -= delta;
            }
        }

        for i in 0..names.len() {
            let elo = elos[i] + deltas[i] / (names.len() - 1) as f64;
            store.set_elo(names[i], game_type, map_name, elo)?;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use teerank_proto::{Capability, Client, ServerInfo};

    fn client(name: &str, score: i32, ingame: bool) -> Client {
        Client {
            name: name.to_owned(),
            clan: None,
            country: 0,
            score,
            ingame,
        }
    }

    fn snapshot(game_type: &str, map_name: &str, clients: Vec<Client>) -> Snapshot {
        Snapshot {
            capability: Capability::Vanilla,
            info: ServerInfo {
                version: "0.6.4".to_owned(),
                name: "test".to_owned(),
                map_name: map_name.to_owned(),
                game_type: game_type.to_owned(),
                num_players: clients.iter().filter(|c| c.ingame).count() as i32,
                max_players: 16,
                num_clients: clients.len() as i32,
                max_clients: 16,
            },
            clients,
        }
    }

    fn two_players(score1: i32, score2: i32) -> Snapshot {
        snapshot(
            "CTF",
            "ctf1",
            vec![client("player1", score1, true), client("player2", score2, true)],
        )
    }

    #[test]
    fn test_rank_player1_win() {
        let mut store = MemoryStore::new();
        let old = two_players(0, 0);
        let new = two_players(1, 0);

        assert!(rank(&mut store, Some(&old), &new).unwrap());

        assert_eq!(store.get_elo("player1", None, None).unwrap(), 1512.5);
        assert_eq!(store.get_elo("player2", None, None).unwrap(), 1487.5);

        // Every game type and map combination is ranked independently.
        assert_eq!(
            store.get_elo("player1", Some("CTF"), Some("ctf1")).unwrap(),
            1512.5
        );
        assert_eq!(store.get_elo("player1", Some("CTF"), None).unwrap(), 1512.5);
        assert_eq!(store.get_elo("player1", None, Some("ctf1")).unwrap(), 1512.5);
    }

    #[test]
    fn test_rank_player2_win() {
        let mut store = MemoryStore::new();
        let old = two_players(0, 0);
        let new = two_players(0, 1);

        assert!(rank(&mut store, Some(&old), &new).unwrap());

        assert_eq!(store.get_elo("player1", None, None).unwrap(), 1487.5);
        assert_eq!(store.get_elo("player2", None, None).unwrap(), 1512.5);
    }

    #[test]
    fn test_rank_draw() {
        let mut store = MemoryStore::new();
        let old = two_players(0, 0);
        let new = two_players(1, 1);

        assert!(rank(&mut store, Some(&old), &new).unwrap());

        assert_eq!(store.get_elo("player1", None, None).unwrap(), 1500.0);
        assert_eq!(store.get_elo("player2", None, None).unwrap(), 1500.0);
    }

    #[test]
    fn test_rank_deltas_are_symmetric() {
        let mut store = MemoryStore::new();
        store.set_elo("player1", None, None, 1700.0).unwrap();

        let old = two_players(0, 0);
        let new = two_players(3, 1);

        assert!(rank(&mut store, Some(&old), &new).unwrap());

        let delta1 = store.get_elo("player1", None, None).unwrap() - 1700.0;
        let delta2 = store.get_elo("player2", None, None).unwrap() - 1500.0;
        assert!((delta1 + delta2).abs() < 1e-9);
    }

    #[test]
    fn test_rank_no_old_state() {
        let mut store = MemoryStore::new();
        let new = two_players(1, 0);

        assert!(!rank(&mut store, None, &new).unwrap());
        assert_eq!(store.get_elo("player1", None, None).unwrap(), 1500.0);
    }

    #[test]
    fn test_rank_gametype_not_supported() {
        let mut store = MemoryStore::new();
        let old = snapshot(
            "BAD_GAMETYPE",
            "ctf1",
            vec![client("player1", 0, true), client("player2", 0, true)],
        );
        let new = snapshot(
            "BAD_GAMETYPE",
            "ctf1",
            vec![client("player1", 1, true), client("player2", 0, true)],
        );

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
        assert_eq!(store.get_elo("player1", None, None).unwrap(), 1500.0);
    }

    #[test]
    fn test_rank_gametype_changed() {
        let mut store = MemoryStore::new();
        let old = snapshot("TDM", "ctf1", vec![client("player1", 0, true), client("player2", 0, true)]);
        let new = two_players(1, 0);

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
    }

    #[test]
    fn test_rank_map_changed() {
        let mut store = MemoryStore::new();
        let old = snapshot("CTF", "ctf2", vec![client("player1", 0, true), client("player2", 0, true)]);
        let new = two_players(1, 0);

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
    }

    #[test]
    fn test_rank_score_regressed() {
        let mut store = MemoryStore::new();
        let old = two_players(1, 1);
        let new = two_players(0, 0);

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
        assert_eq!(store.get_elo("player1", None, None).unwrap(), 1500.0);
    }

    #[test]
    fn test_rank_zero_aggregate_delta() {
        let mut store = MemoryStore::new();
        let old = two_players(0, 0);
        let new = two_players(1, -1);

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
    }

    #[test]
    fn test_rank_single_common_player() {
        let mut store = MemoryStore::new();
        let old = snapshot(
            "CTF",
            "ctf1",
            vec![client("player1", 0, true), client("player2", 0, true)],
        );
        let new = snapshot(
            "CTF",
            "ctf1",
            vec![client("player1", 1, true), client("player3", 0, true)],
        );

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
    }

    #[test]
    fn test_rank_spectators_are_ignored() {
        let mut store = MemoryStore::new();
        let old = snapshot(
            "CTF",
            "ctf1",
            vec![client("player1", 0, true), client("player2", 0, false)],
        );
        let new = snapshot(
            "CTF",
            "ctf1",
            vec![client("player1", 1, true), client("player2", 0, false)],
        );

        assert!(!rank(&mut store, Some(&old), &new).unwrap());
    }
}
