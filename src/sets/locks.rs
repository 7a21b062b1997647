use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::sets::dto::{LockDto, SuccessResponse};
use crate::sets::repo;
use crate::state::AppState;

/// Advisory per-flashcard editing locks. Purely in-process and lost on
/// restart; leases expire so an abandoned tab cannot hold a card forever.
pub struct LockTable {
    ttl: Duration,
    inner: Mutex<HashMap<Uuid, LockEntry>>,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    set_id: Uuid,
    holder: Uuid,
    expires_at: Instant,
}

impl LockTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Acquire or renew the lock on a card. Fails with the current holder's id
    /// when someone else holds a live lease.
    pub fn acquire(&self, set_id: Uuid, card_id: Uuid, holder: Uuid) -> Result<(), Uuid> {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("lock table poisoned");
        if let Some(entry) = map.get(&card_id) {
            if entry.expires_at > now && entry.holder != holder {
                return Err(entry.holder);
            }
        }
        map.insert(
            card_id,
            LockEntry {
                set_id,
                holder,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    /// Release a held lock. Absent or expired entries release trivially;
    /// a live lease held by someone else does not.
    pub fn release(&self, card_id: Uuid, holder: Uuid) -> bool {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("lock table poisoned");
        match map.get(&card_id) {
            Some(entry) if entry.expires_at > now && entry.holder != holder => false,
            Some(_) => {
                map.remove(&card_id);
                true
            }
            None => true,
        }
    }

    /// Live locks for a set. Expired entries are reaped on the way out.
    pub fn active_for_set(&self, set_id: Uuid) -> Vec<(Uuid, Uuid, Duration)> {
        let now = Instant::now();
        let mut map = self.inner.lock().expect("lock table poisoned");
        map.retain(|_, entry| entry.expires_at > now);
        map.iter()
            .filter(|(_, entry)| entry.set_id == set_id)
            .map(|(card_id, entry)| (*card_id, entry.holder, entry.expires_at - now))
            .collect()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sets/:id/flashcards/:card_id/lock",
            post(acquire_lock).delete(release_lock),
        )
        .route("/sets/:id/locks", get(list_locks))
}

#[instrument(skip(state))]
pub async fn acquire_lock(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((set_id, card_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<LockDto>, (StatusCode, String)> {
    repo::accessible_set(&state.db, set_id, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Set not found".to_string()))?;
    repo::find_card_in_set(&state.db, set_id, card_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Flashcard not found".to_string()))?;

    state
        .locks
        .acquire(set_id, card_id, user_id)
        .map_err(|holder| {
            debug!(%card_id, %holder, "lock contention");
            (
                StatusCode::CONFLICT,
                "Flashcard is being edited by another user".to_string(),
            )
        })?;

    Ok(Json(LockDto {
        flashcard_id: card_id,
        holder: user_id,
        expires_in_seconds: state.locks.ttl().as_secs(),
    }))
}

#[instrument(skip(state))]
pub async fn release_lock(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((_set_id, card_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SuccessResponse>, (StatusCode, String)> {
    if !state.locks.release(card_id, user_id) {
        return Err((
            StatusCode::CONFLICT,
            "Flashcard is locked by another user".to_string(),
        ));
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state))]
pub async fn list_locks(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(set_id): Path<Uuid>,
) -> Json<Vec<LockDto>> {
    let locks = state
        .locks
        .active_for_set(set_id)
        .into_iter()
        .map(|(flashcard_id, holder, remaining)| LockDto {
            flashcard_id,
            holder,
            expires_in_seconds: remaining.as_secs(),
        })
        .collect();
    Json(locks)
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_conflicts_while_lease_is_live() {
        let table = LockTable::new(Duration::from_secs(60));
        let (set, card) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(table.acquire(set, card, alice).is_ok());
        assert_eq!(table.acquire(set, card, bob), Err(alice));
        // the holder may renew
        assert!(table.acquire(set, card, alice).is_ok());
    }

    #[test]
    fn expired_lease_is_up_for_grabs() {
        let table = LockTable::new(Duration::ZERO);
        let (set, card) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(table.acquire(set, card, alice).is_ok());
        assert!(table.acquire(set, card, bob).is_ok());
    }

    #[test]
    fn release_respects_the_holder() {
        let table = LockTable::new(Duration::from_secs(60));
        let (set, card) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(table.acquire(set, card, alice).is_ok());
        assert!(!table.release(card, bob));
        assert!(table.release(card, alice));
        // releasing an unheld card is a no-op
        assert!(table.release(card, alice));
    }

    #[test]
    fn listing_reaps_expired_entries() {
        let table = LockTable::new(Duration::ZERO);
        let set = Uuid::new_v4();
        table
            .acquire(set, Uuid::new_v4(), Uuid::new_v4())
            .expect("fresh card");
        assert!(table.active_for_set(set).is_empty());
    }

    #[test]
    fn listing_is_scoped_to_the_set() {
        let table = LockTable::new(Duration::from_secs(60));
        let (set_a, set_b) = (Uuid::new_v4(), Uuid::new_v4());
        let card = Uuid::new_v4();
        table.acquire(set_a, card, Uuid::new_v4()).expect("lock");

        assert_eq!(table.active_for_set(set_a).len(), 1);
        assert!(table.active_for_set(set_b).is_empty());
    }
}
