//! Segment and user storage.
//!
//! Both stores are the only shared mutable state in the engine. Each exposes a
//! single-record atomic read-modify-write so concurrent traces never lose an
//! update, and the segment store's upsert guarantees at most one segment per
//! start coordinate.
//!
//! The in-memory stores back tests, demos and the mobile FFI. A database-backed
//! store implements the same traits.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use rstar::{RTree, RTreeObject, AABB};
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::geo_utils::coord_key;
use crate::ledger::User;
use crate::segment::{Segment, SegmentKey};
use crate::{Bounds, GpsPoint};

/// Mutation run under the segment's write lock. Return `false` to abort
/// without writing.
pub type SegmentMutation = Box<dyn FnOnce(&mut Segment) -> bool + Send>;

/// Mutation run under the user's write lock. Its flag is handed back to the
/// caller with the updated record.
pub type UserMutation = Box<dyn FnOnce(&mut User) -> bool + Send>;

/// Outcome of [`SegmentStore::upsert_segment`].
#[derive(Debug, Clone)]
pub struct Upserted {
    pub segment: Segment,
    pub created: bool,
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Return the segment starting exactly at `start`, creating it with
    /// `seed_likelihood` if none exists. Lookup and insert are atomic.
    async fn upsert_segment(&self, start: GpsPoint, seed_likelihood: f64) -> Result<Upserted>;

    /// Atomically read, mutate and write one segment.
    ///
    /// `Ok(None)` means the mutation declined and nothing was written.
    async fn update_segment(&self, key: &str, mutation: SegmentMutation) -> Result<Option<Segment>>;

    async fn get_segment(&self, key: &str) -> Result<Option<Segment>>;

    async fn all_segments(&self) -> Result<Vec<Segment>>;

    /// Segments whose start lies inside `bounds` (edges inclusive).
    async fn segments_within(&self, bounds: &Bounds) -> Result<Vec<Segment>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Write a whole user record, replacing any stored copy. Trace processing
    /// goes through [`UserStore::update_user`] instead so concurrent traces by
    /// the same user cannot overwrite each other.
    async fn save_user(&self, user: &User) -> Result<()>;

    /// Atomically read, mutate and write one user, returning the new record
    /// and the mutation's flag.
    async fn update_user(&self, id: &str, mutation: UserMutation) -> Result<(User, bool)>;
}

// ============================================================================
// In-memory segment store
// ============================================================================

/// Start coordinate of a stored segment, indexed for window queries.
#[derive(Debug, Clone, PartialEq)]
struct SegmentLocation {
    key: SegmentKey,
    lat: f64,
    lng: f64,
}

impl RTreeObject for SegmentLocation {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

#[derive(Default)]
struct SegmentTable {
    segments: HashMap<SegmentKey, Segment>,
    index: RTree<SegmentLocation>,
    next_id: u64,
}

#[derive(Default)]
pub struct InMemorySegmentStore {
    inner: RwLock<SegmentTable>,
}

impl InMemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.segments.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert or replace a segment as-is. Used to seed stores from a snapshot.
    pub async fn insert_segment(&self, segment: Segment) {
        let mut table = self.inner.write().await;
        let key = segment.key();
        table.next_id = table.next_id.max(segment.id + 1);
        if !table.segments.contains_key(&key) {
            table.index.insert(SegmentLocation {
                key: key.clone(),
                lat: segment.start.latitude,
                lng: segment.start.longitude,
            });
        }
        table.segments.insert(key, segment);
    }
}

#[async_trait]
impl SegmentStore for InMemorySegmentStore {
    async fn upsert_segment(&self, start: GpsPoint, seed_likelihood: f64) -> Result<Upserted> {
        let key = coord_key(&start);
        let mut table = self.inner.write().await;

        if let Some(existing) = table.segments.get(&key) {
            return Ok(Upserted { segment: existing.clone(), created: false });
        }

        let id = table.next_id;
        table.next_id += 1;
        let segment = Segment::new(id, start, seed_likelihood);
        debug!("[SegmentStore] Created segment #{} at {}", id, key);

        table.index.insert(SegmentLocation {
            key: key.clone(),
            lat: start.latitude,
            lng: start.longitude,
        });
        table.segments.insert(key, segment.clone());

        Ok(Upserted { segment, created: true })
    }

    async fn update_segment(&self, key: &str, mutation: SegmentMutation) -> Result<Option<Segment>> {
        let mut table = self.inner.write().await;
        let stored = table
            .segments
            .get_mut(key)
            .ok_or_else(|| EngineError::Storage(format!("segment {} missing", key)))?;

        // Work on a copy so a declined mutation leaves the record untouched.
        let mut draft = stored.clone();
        if !mutation(&mut draft) {
            return Ok(None);
        }
        *stored = draft.clone();
        Ok(Some(draft))
    }

    async fn get_segment(&self, key: &str) -> Result<Option<Segment>> {
        Ok(self.inner.read().await.segments.get(key).cloned())
    }

    async fn all_segments(&self) -> Result<Vec<Segment>> {
        let table = self.inner.read().await;
        let mut segments: Vec<Segment> = table.segments.values().cloned().collect();
        segments.sort_by_key(|s| s.id);
        Ok(segments)
    }

    async fn segments_within(&self, bounds: &Bounds) -> Result<Vec<Segment>> {
        let table = self.inner.read().await;
        let envelope = AABB::from_corners(
            [bounds.min_lng, bounds.min_lat],
            [bounds.max_lng, bounds.max_lat],
        );

        let mut segments: Vec<Segment> = table
            .index
            .locate_in_envelope(&envelope)
            .filter_map(|loc| table.segments.get(&loc.key).cloned())
            .collect();
        segments.sort_by_key(|s| s.id);
        Ok(segments)
    }
}

// ============================================================================
// In-memory user store
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user as-is. Used to seed stores from a snapshot.
    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Create a fresh user unless `id` is already registered. Returns whether
    /// a new record was created; an existing record keeps its progress.
    pub async fn register_user(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut users = self.users.write().await;
        if users.contains_key(&id) {
            return false;
        }
        users.insert(id.clone(), User::new(id));
        true
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, id: &str, mutation: UserMutation) -> Result<(User, bool)> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("user {}", id)))?;
        let flag = mutation(user);
        Ok((user.clone(), flag))
    }
}
