// In-memory conversation history, keyed by player id.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics;

/// Turns kept per player.
pub const DEFAULT_MAX_TURNS: usize = 10;
/// Distinct player ids tracked at once.
pub const DEFAULT_MAX_PLAYERS: usize = 1000;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a player's conversation with the narrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-player summary reported by `/memory_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMemoryStats {
    pub message_count: usize,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_players: usize,
    pub details: BTreeMap<String, PlayerMemoryStats>,
}

#[derive(Debug)]
struct PlayerLog {
    turns: VecDeque<ConversationTurn>,
    last_activity: DateTime<Utc>,
    /// Logical clock value of the last access, for LRU eviction.
    touched: u64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    players: HashMap<String, PlayerLog>,
    clock: u64,
}

/// Bounded conversation store shared by all request handlers.
///
/// Each player keeps at most `max_turns` turns; when a new player id would
/// exceed `max_players`, the least recently used player is forgotten.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    inner: Arc<Mutex<MemoryInner>>,
    max_turns: usize,
    max_players: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize, max_players: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            max_turns: max_turns.max(1),
            max_players: max_players.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the player's history in order, creating an empty one if needed.
    pub fn get(&self, player_id: &str) -> Vec<ConversationTurn> {
        let mut inner = self.lock();
        let log = self.touch(&mut inner, player_id);
        log.turns.iter().cloned().collect()
    }

    /// Append one turn, then drop the oldest turns beyond the cap.
    pub fn append(&self, player_id: &str, role: Role, content: impl Into<String>) {
        let mut inner = self.lock();
        let max_turns = self.max_turns;
        let log = self.touch(&mut inner, player_id);
        let turn = ConversationTurn::new(role, content);
        log.last_activity = turn.timestamp;
        log.turns.push_back(turn);
        while log.turns.len() > max_turns {
            log.turns.pop_front();
        }
    }

    /// Append a player prompt and the narrator's reply.
    pub fn record_exchange(&self, player_id: &str, prompt: &str, reply: &str) {
        self.append(player_id, Role::User, prompt);
        self.append(player_id, Role::Assistant, reply);
    }

    /// Empty a player's history. Returns the number of turns afterwards.
    pub fn clear(&self, player_id: &str) -> usize {
        let mut inner = self.lock();
        let log = self.touch(&mut inner, player_id);
        log.turns.clear();
        log.last_activity = Utc::now();
        tracing::debug!(player_id, "conversation memory cleared");
        log.turns.len()
    }

    /// Number of turns currently held for a player (0 if unknown).
    pub fn len(&self, player_id: &str) -> usize {
        self.lock()
            .players
            .get(player_id)
            .map(|log| log.turns.len())
            .unwrap_or(0)
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn stats(&self) -> MemoryStats {
        let inner = self.lock();
        let details = inner
            .players
            .iter()
            .map(|(id, log)| {
                (
                    id.clone(),
                    PlayerMemoryStats {
                        message_count: log.turns.len(),
                        last_activity: log.last_activity,
                    },
                )
            })
            .collect();
        MemoryStats {
            total_players: inner.players.len(),
            details,
        }
    }

    /// Look up (or create) a player's log and mark it as most recently used.
    fn touch<'a>(&self, inner: &'a mut MemoryInner, player_id: &str) -> &'a mut PlayerLog {
        inner.clock += 1;
        let now = inner.clock;

        if !inner.players.contains_key(player_id) {
            if inner.players.len() >= self.max_players {
                Self::evict_oldest(inner);
            }
            metrics::MEMORY_PLAYERS.set(inner.players.len() as i64 + 1);
        }

        let log = inner
            .players
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerLog {
                turns: VecDeque::new(),
                last_activity: Utc::now(),
                touched: now,
            });
        log.touched = now;
        log
    }

    fn evict_oldest(inner: &mut MemoryInner) {
        let oldest = inner
            .players
            .iter()
            .min_by_key(|(_, log)| log.touched)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            inner.players.remove(&id);
            metrics::MEMORY_EVICTIONS_TOTAL.inc();
            tracing::info!(player_id = %id, "evicted least recently used conversation");
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS, DEFAULT_MAX_PLAYERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_creates_empty_history() {
        let memory = ConversationMemory::default();
        assert!(memory.get("alice").is_empty());
        assert_eq!(memory.player_count(), 1);
    }

    #[test]
    fn test_append_keeps_order() {
        let memory = ConversationMemory::default();
        memory.record_exchange("alice", "I look around", "You see a goblin.");

        let turns = memory.get("alice");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "I look around");
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_history_never_exceeds_cap() {
        let memory = ConversationMemory::default();
        for i in 0..37 {
            memory.append("alice", Role::User, format!("turn {i}"));
            assert!(memory.len("alice") <= DEFAULT_MAX_TURNS);
        }
        let turns = memory.get("alice");
        assert_eq!(turns.len(), DEFAULT_MAX_TURNS);
        // Oldest entries are dropped from the front
        assert_eq!(turns[0].content, "turn 27");
        assert_eq!(turns[9].content, "turn 36");
    }

    #[test]
    fn test_clear_empties_only_that_player() {
        let memory = ConversationMemory::default();
        memory.record_exchange("alice", "hi", "hello");
        memory.record_exchange("bob", "hi", "hello");

        assert_eq!(memory.clear("alice"), 0);
        assert_eq!(memory.len("alice"), 0);
        assert_eq!(memory.len("bob"), 2);

        let stats = memory.stats();
        assert_eq!(stats.total_players, 2);
        assert_eq!(stats.details["alice"].message_count, 0);
        assert_eq!(stats.details["bob"].message_count, 2);
    }

    #[test]
    fn test_least_recently_used_player_evicted() {
        let memory = ConversationMemory::new(DEFAULT_MAX_TURNS, 2);
        memory.append("alice", Role::User, "one");
        memory.append("bob", Role::User, "two");
        // Touch alice so bob becomes the eviction candidate
        memory.get("alice");
        memory.append("carol", Role::User, "three");

        let stats = memory.stats();
        assert_eq!(stats.total_players, 2);
        assert!(stats.details.contains_key("alice"));
        assert!(stats.details.contains_key("carol"));
        assert!(!stats.details.contains_key("bob"));
    }

    #[test]
    fn test_clones_share_state() {
        let memory = ConversationMemory::default();
        let handle = memory.clone();
        handle.append("alice", Role::Assistant, "Welcome");
        assert_eq!(memory.len("alice"), 1);
    }
}
