//! Connection state machine and recommendation ranking.
//!
//! A connection is requested in `pending` state by its sender and resolved
//! exactly once by its receiver. The accepted rows form an undirected graph
//! which the recommendation ranking walks to count mutual connections.

use rand::seq::SliceRandom;
use rand::Rng;
use shared_proto::social::ConnectionStatus;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Connection, UserPublic};
use crate::store::SocialStore;

/// What a receiver may do with a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accept,
    Decline,
}

impl Resolution {
    pub fn status(self) -> ConnectionStatus {
        match self {
            Resolution::Accept => ConnectionStatus::Accepted,
            Resolution::Decline => ConnectionStatus::Declined,
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Resolution::Accept => "accepted",
            Resolution::Decline => "declined",
        }
    }
}

/// Opens a pending request from `sender` to `receiver`.
pub async fn request(
    store: &dyn SocialStore,
    sender: Uuid,
    receiver: Uuid,
) -> ApiResult<Connection> {
    if sender == receiver {
        return Err(ApiError::BadRequest("Cannot connect to yourself".to_string()));
    }
    if store.find_user(receiver).await?.is_none() {
        return Err(ApiError::not_found("User"));
    }

    let connection = Connection::request(sender, receiver);
    store.insert_connection(&connection).await?;

    tracing::info!(
        component = "connections",
        connection_id = %connection.id,
        sender = %sender,
        receiver = %receiver,
        "connection requested"
    );
    Ok(connection)
}

/// Resolves a pending request addressed to `receiver`. Missing, already
/// resolved and foreign requests are indistinguishable to the caller.
pub async fn resolve(
    store: &dyn SocialStore,
    receiver: Uuid,
    connection_id: Uuid,
    resolution: Resolution,
) -> ApiResult<Connection> {
    let connection = store
        .resolve_connection(connection_id, receiver, resolution.status())
        .await?
        .ok_or_else(|| ApiError::not_found("Connection"))?;

    tracing::info!(
        component = "connections",
        connection_id = %connection.id,
        receiver = %receiver,
        status = connection.status.as_str(),
        "connection resolved"
    );
    Ok(connection)
}

pub async fn are_connected(store: &dyn SocialStore, a: Uuid, b: Uuid) -> ApiResult<bool> {
    if a == b {
        return Ok(false);
    }
    Ok(store.are_connected(a, b).await?)
}

pub async fn list_accepted(store: &dyn SocialStore, user: Uuid) -> ApiResult<Vec<UserPublic>> {
    Ok(store.accepted_counterparts(user).await?)
}

/// Users linked to `user` by a connection in `status`, in either direction.
pub fn counterparts(connections: &[Connection], user: Uuid, status: ConnectionStatus) -> HashSet<Uuid> {
    connections
        .iter()
        .filter(|c| c.status == status)
        .filter_map(|c| c.counterpart(user))
        .collect()
}

/// Ranks `candidates` for `user` by mutual connection count, highest first.
///
/// The requester, accepted counterparts and pending counterparts are never
/// returned. Candidates with equal counts come out in an order decided by
/// `rng`; only membership of a tie group is stable.
pub fn rank_candidates<R: Rng + ?Sized>(
    user: Uuid,
    candidates: impl IntoIterator<Item = Uuid>,
    connections: &[Connection],
    limit: usize,
    rng: &mut R,
) -> Vec<(Uuid, i64)> {
    let connected = counterparts(connections, user, ConnectionStatus::Accepted);
    let pending = counterparts(connections, user, ConnectionStatus::Pending);

    let mut accepted_neighbours: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for c in connections
        .iter()
        .filter(|c| c.status == ConnectionStatus::Accepted)
    {
        accepted_neighbours
            .entry(c.sender_id)
            .or_default()
            .insert(c.receiver_id);
        accepted_neighbours
            .entry(c.receiver_id)
            .or_default()
            .insert(c.sender_id);
    }

    let mut seen = HashSet::new();
    let mut ranked: Vec<(Uuid, i64)> = candidates
        .into_iter()
        .filter(|id| *id != user && !connected.contains(id) && !pending.contains(id))
        .filter(|id| seen.insert(*id))
        .map(|id| {
            let mutual = accepted_neighbours
                .get(&id)
                .map(|neighbours| neighbours.intersection(&connected).count())
                .unwrap_or(0);
            (id, mutual as i64)
        })
        .collect();

    ranked.shuffle(rng);
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn accepted(a: Uuid, b: Uuid) -> Connection {
        let mut c = Connection::request(a, b);
        c.status = ConnectionStatus::Accepted;
        c
    }

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn pool_excludes_self_connected_and_pending() {
        let u = ids(5);
        let (me, friend, asked, asker, stranger) = (u[0], u[1], u[2], u[3], u[4]);
        let mut declined = Connection::request(me, stranger);
        declined.status = ConnectionStatus::Declined;
        let connections = vec![
            accepted(friend, me),
            Connection::request(me, asked),
            Connection::request(asker, me),
            declined,
        ];

        let mut rng = StdRng::seed_from_u64(7);
        let ranked = rank_candidates(me, u.clone(), &connections, 10, &mut rng);
        let pool: Vec<Uuid> = ranked.iter().map(|(id, _)| *id).collect();

        assert_eq!(pool, vec![stranger]);
    }

    #[test]
    fn candidates_are_ordered_by_mutual_count() {
        let u = ids(6);
        let (me, f1, f2, two_mutual, one_mutual, none) = (u[0], u[1], u[2], u[3], u[4], u[5]);
        let connections = vec![
            accepted(me, f1),
            accepted(f2, me),
            accepted(two_mutual, f1),
            accepted(f2, two_mutual),
            accepted(one_mutual, f2),
        ];

        let mut rng = StdRng::seed_from_u64(1);
        let ranked = rank_candidates(me, u.clone(), &connections, 10, &mut rng);

        assert_eq!(ranked, vec![(two_mutual, 2), (one_mutual, 1), (none, 0)]);
    }

    #[test]
    fn ties_keep_membership_but_not_order() {
        let me = Uuid::new_v4();
        let candidates = ids(30);
        let expected: HashSet<Uuid> = candidates.iter().copied().collect();

        let mut orders = HashSet::new();
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ranked = rank_candidates(me, candidates.clone(), &[], 30, &mut rng);
            let members: HashSet<Uuid> = ranked.iter().map(|(id, _)| *id).collect();
            assert_eq!(members, expected);
            orders.insert(ranked.iter().map(|(id, _)| *id).collect::<Vec<_>>());
        }
        assert!(orders.len() > 1, "tie order should vary with the rng");
    }

    #[test]
    fn result_is_capped_and_keeps_highest_scores() {
        let u = ids(2);
        let (me, friend) = (u[0], u[1]);
        let mut connections = vec![accepted(me, friend)];
        let linked = ids(3);
        for id in &linked {
            connections.push(accepted(*id, friend));
        }
        let mut candidates = ids(20);
        candidates.extend(linked.iter().copied());

        let mut rng = StdRng::seed_from_u64(3);
        let ranked = rank_candidates(me, candidates, &connections, 10, &mut rng);

        assert_eq!(ranked.len(), 10);
        let top: HashSet<Uuid> = ranked[..3].iter().map(|(id, _)| *id).collect();
        assert_eq!(top, linked.into_iter().collect());
        assert!(ranked[3..].iter().all(|(_, mutual)| *mutual == 0));
    }
}
