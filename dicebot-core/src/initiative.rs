//! Initiative tracking for combat encounters.
//!
//! Each chat channel (or server) gets its own ordered list of combatants,
//! kept sorted descending by initiative total. The tracker is an explicit
//! store object; wrap it in [`SharedTracker`] to share it across async
//! command handlers. Sessions are ephemeral per encounter - nothing is
//! persisted.

use crate::advantage::AdvantageMode;
use crate::fuzzy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Most combatants one session may hold.
pub const DEFAULT_CAPACITY: usize = 25;

/// Minimum fuzzy score for an autocomplete suggestion.
const SUGGESTION_THRESHOLD: u8 = 75;
/// Most suggestions returned for one query.
const SUGGESTION_LIMIT: usize = 25;

/// Error type for initiative operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Nobody named \"{0}\" is in the initiative order")]
    NotFound(String),
    #[error("The initiative order is full ({capacity} combatants)")]
    CapacityExceeded { capacity: usize },
}

/// Identifies one combat session (a channel or server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat-platform user reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One combatant's place in the initiative order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    /// Display name, unique within its session after normalization.
    pub name: String,
    /// Raw d20 faces, one per advantage-mode repetition. Synthetic values
    /// outside 1-20 appear when a total was set directly.
    pub rolls: Vec<i32>,
    pub modifier: i32,
    pub mode: AdvantageMode,
    pub is_npc: bool,
    pub owner: Option<UserId>,
}

impl InitiativeEntry {
    /// Roll fresh d20s for a combatant.
    pub fn roll(name: impl Into<String>, modifier: i32, mode: AdvantageMode) -> Self {
        Self::roll_with_rng(name, modifier, mode, &mut rand::thread_rng())
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng>(
        name: impl Into<String>,
        modifier: i32,
        mode: AdvantageMode,
        rng: &mut R,
    ) -> Self {
        let rolls = (0..mode.roll_count()).map(|_| rng.gen_range(1..=20)).collect();
        Self {
            name: name.into(),
            rolls,
            modifier,
            mode,
            is_npc: false,
            owner: None,
        }
    }

    /// Create an entry at a fixed total instead of rolling.
    pub fn with_fixed_total(name: impl Into<String>, modifier: i32, total: i32) -> Self {
        Self {
            name: name.into(),
            rolls: vec![total - modifier],
            modifier,
            mode: AdvantageMode::Normal,
            is_npc: false,
            owner: None,
        }
    }

    /// Mark the entry as a non-player combatant.
    pub fn as_npc(mut self) -> Self {
        self.is_npc = true;
        self
    }

    /// Attach the owning user.
    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// The d20 face the advantage mode keeps.
    pub fn selected_roll(&self) -> i32 {
        let totals: Vec<i64> = self.rolls.iter().map(|&r| i64::from(r)).collect();
        let index = self.mode.pick(&totals);
        self.rolls.get(index).copied().unwrap_or(0)
    }

    /// Initiative total: selected d20 face plus modifier.
    pub fn total(&self) -> i32 {
        self.selected_roll() + self.modifier
    }

    /// Overwrite the total, recomputing the d20/modifier split into a
    /// single synthetic face.
    pub fn set_total(&mut self, total: i32) {
        self.rolls = vec![total - self.modifier];
        self.mode = AdvantageMode::Normal;
    }
}

impl fmt::Display for InitiativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.total(), self.name)
    }
}

/// Canonical form of a name for uniqueness checks.
fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Case-folded name with all whitespace removed, for fuzzy scoring.
fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Sessions
// ============================================================================

/// Ordered initiative list for one session.
///
/// Invariant: entries are always sorted non-increasing by total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiativeSession {
    entries: Vec<InitiativeEntry>,
}

impl InitiativeSession {
    pub fn entries(&self) -> &[InitiativeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position_of(&self, normalized: &str) -> Option<usize> {
        self.entries.iter().position(|e| normalize(&e.name) == normalized)
    }

    /// Insert before the first entry with a strictly lower total, so a new
    /// entry wins ties against existing equal totals.
    fn insert(&mut self, entry: InitiativeEntry) {
        let total = entry.total();
        let position = self
            .entries
            .iter()
            .position(|e| e.total() < total)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
    }
}

/// Specification for adding a group of identically-named combatants.
#[derive(Debug, Clone)]
pub struct GroupRollSpec {
    /// Name prefix; entries are named `"{prefix} 1"`, `"{prefix} 2"`, ...
    pub prefix: String,
    pub count: usize,
    pub modifier: i32,
    pub mode: AdvantageMode,
    /// All entries reuse the first entry's faces (one roll for the pack).
    pub shared: bool,
}

// ============================================================================
// Tracker
// ============================================================================

/// In-memory initiative store, keyed by session.
///
/// Construct one at startup and hand callers a reference (or a
/// [`SharedTracker`]); state is lost on restart by design.
#[derive(Debug)]
pub struct InitiativeTracker {
    sessions: HashMap<SessionKey, InitiativeSession>,
    capacity: usize,
}

impl InitiativeTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries for a session, best initiative first. Empty if the session
    /// does not exist.
    pub fn entries(&self, key: SessionKey) -> &[InitiativeEntry] {
        self.sessions.get(&key).map(InitiativeSession::entries).unwrap_or(&[])
    }

    pub fn len(&self, key: SessionKey) -> usize {
        self.sessions.get(&key).map(InitiativeSession::len).unwrap_or(0)
    }

    pub fn is_empty(&self, key: SessionKey) -> bool {
        self.len(key) == 0
    }

    /// Add a combatant.
    ///
    /// A name collision (case-insensitive, whitespace-trimmed) replaces the
    /// existing entry and never hits the capacity check. A genuinely new
    /// name is rejected once the session is full, leaving state unchanged.
    pub fn add(&mut self, key: SessionKey, entry: InitiativeEntry) -> Result<(), TrackerError> {
        let normalized = normalize(&entry.name);
        match self.sessions.get_mut(&key) {
            Some(session) => {
                if let Some(position) = session.position_of(&normalized) {
                    session.entries.remove(position);
                } else if session.len() >= self.capacity {
                    return Err(TrackerError::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
                debug!(session = %key, name = %entry.name, total = entry.total(), "initiative add");
                session.insert(entry);
            }
            None => {
                debug!(session = %key, name = %entry.name, total = entry.total(), "initiative add");
                let mut session = InitiativeSession::default();
                session.insert(entry);
                self.sessions.insert(key, session);
            }
        }
        Ok(())
    }

    /// Roll (or fix) a combatant's initiative and add them in one step.
    pub fn add_roll(
        &mut self,
        key: SessionKey,
        name: impl Into<String>,
        modifier: i32,
        mode: AdvantageMode,
        fixed_total: Option<i32>,
    ) -> Result<InitiativeEntry, TrackerError> {
        let entry = match fixed_total {
            Some(total) => InitiativeEntry::with_fixed_total(name, modifier, total),
            None => InitiativeEntry::roll(name, modifier, mode),
        };
        self.add(key, entry.clone())?;
        Ok(entry)
    }

    /// Remove a combatant by name. Deletes the session when it empties.
    pub fn remove(
        &mut self,
        key: SessionKey,
        name: &str,
    ) -> Result<InitiativeEntry, TrackerError> {
        let normalized = normalize(name);
        let session = self
            .sessions
            .get_mut(&key)
            .ok_or_else(|| TrackerError::NotFound(name.trim().to_string()))?;
        let position = session
            .position_of(&normalized)
            .ok_or_else(|| TrackerError::NotFound(name.trim().to_string()))?;
        let entry = session.entries.remove(position);
        if session.is_empty() {
            self.sessions.remove(&key);
        }
        debug!(session = %key, name = %entry.name, "initiative remove");
        Ok(entry)
    }

    /// Overwrite a combatant's total in place and re-sort it.
    pub fn set_total(
        &mut self,
        key: SessionKey,
        name: &str,
        total: i32,
    ) -> Result<InitiativeEntry, TrackerError> {
        let mut entry = self.remove(key, name)?;
        entry.set_total(total);
        self.add(key, entry.clone())?;
        Ok(entry)
    }

    /// Add a whole group at once, atomically against capacity.
    ///
    /// The batch is sorted by total before numbering, so `"{prefix} 1"` is
    /// always the highest-rolling member.
    pub fn add_group(
        &mut self,
        key: SessionKey,
        spec: &GroupRollSpec,
    ) -> Result<Vec<InitiativeEntry>, TrackerError> {
        self.add_group_with_rng(key, spec, &mut rand::thread_rng())
    }

    /// Group add with a specific RNG (useful for testing).
    pub fn add_group_with_rng<R: Rng>(
        &mut self,
        key: SessionKey,
        spec: &GroupRollSpec,
        rng: &mut R,
    ) -> Result<Vec<InitiativeEntry>, TrackerError> {
        if self.len(key) + spec.count > self.capacity {
            return Err(TrackerError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let mut batch: Vec<InitiativeEntry> = Vec::with_capacity(spec.count);
        for i in 0..spec.count {
            let entry = if spec.shared && i > 0 {
                batch[0].clone()
            } else {
                InitiativeEntry::roll_with_rng("", spec.modifier, spec.mode, rng).as_npc()
            };
            batch.push(entry);
        }

        batch.sort_by(|a, b| b.total().cmp(&a.total()));
        for (i, entry) in batch.iter_mut().enumerate() {
            entry.name = format!("{} {}", spec.prefix, i + 1);
        }
        for entry in &batch {
            self.add(key, entry.clone())?;
        }
        Ok(batch)
    }

    /// Drop a whole session. No-op if it does not exist.
    pub fn clear(&mut self, key: SessionKey) {
        if self.sessions.remove(&key).is_some() {
            debug!(session = %key, "initiative cleared");
        }
    }

    /// Autocomplete suggestions for a partial name.
    ///
    /// Fuzzy partial-ratio match, case- and whitespace-insensitive, scored
    /// at least 75; names starting with the query rank first, then higher
    /// scores, then alphabetical order. At most 25 results.
    pub fn suggestions(&self, key: SessionKey, query: &str) -> Vec<String> {
        let Some(session) = self.sessions.get(&key) else {
            return Vec::new();
        };
        let needle = squash(query);

        let mut scored: Vec<(bool, u8, &str)> = Vec::new();
        for entry in session.entries() {
            let haystack = squash(&entry.name);
            let score = fuzzy::partial_ratio(&needle, &haystack);
            if score >= SUGGESTION_THRESHOLD {
                scored.push((haystack.starts_with(&needle), score, entry.name.as_str()));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(b.2)));
        scored.truncate(SUGGESTION_LIMIT);
        scored.into_iter().map(|(_, _, name)| name.to_string()).collect()
    }
}

impl Default for InitiativeTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Cloneable handle sharing one tracker across async command handlers.
///
/// Every operation holds the lock for its whole check-then-mutate
/// sequence, so capacity checks stay atomic under concurrent commands.
#[derive(Debug, Clone)]
pub struct SharedTracker {
    inner: Arc<Mutex<InitiativeTracker>>,
}

impl SharedTracker {
    pub fn new(tracker: InitiativeTracker) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracker)),
        }
    }

    pub async fn add(&self, key: SessionKey, entry: InitiativeEntry) -> Result<(), TrackerError> {
        self.inner.lock().await.add(key, entry)
    }

    pub async fn add_roll(
        &self,
        key: SessionKey,
        name: impl Into<String>,
        modifier: i32,
        mode: AdvantageMode,
        fixed_total: Option<i32>,
    ) -> Result<InitiativeEntry, TrackerError> {
        self.inner
            .lock()
            .await
            .add_roll(key, name, modifier, mode, fixed_total)
    }

    pub async fn remove(
        &self,
        key: SessionKey,
        name: &str,
    ) -> Result<InitiativeEntry, TrackerError> {
        self.inner.lock().await.remove(key, name)
    }

    pub async fn set_total(
        &self,
        key: SessionKey,
        name: &str,
        total: i32,
    ) -> Result<InitiativeEntry, TrackerError> {
        self.inner.lock().await.set_total(key, name, total)
    }

    pub async fn add_group(
        &self,
        key: SessionKey,
        spec: &GroupRollSpec,
    ) -> Result<Vec<InitiativeEntry>, TrackerError> {
        self.inner.lock().await.add_group(key, spec)
    }

    pub async fn clear(&self, key: SessionKey) {
        self.inner.lock().await.clear(key);
    }

    pub async fn entries(&self, key: SessionKey) -> Vec<InitiativeEntry> {
        self.inner.lock().await.entries(key).to_vec()
    }

    pub async fn suggestions(&self, key: SessionKey, query: &str) -> Vec<String> {
        self.inner.lock().await.suggestions(key, query)
    }
}

impl Default for SharedTracker {
    fn default() -> Self {
        Self::new(InitiativeTracker::new())
    }
}
