// Player record and its local persistence.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed storage key the player record lives under.
pub const STORAGE_KEY: &str = "playerData";

/// Health every new character starts with.
pub const STARTING_HP: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub str: i32,
    pub dex: i32,
    pub int: i32,
}

/// The player's character sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub username: String,
    pub stats: Stats,
    pub hp: i32,
    pub max_hp: i32,
}

impl PlayerData {
    /// A fresh character at full health.
    pub fn create(username: impl Into<String>, stats: Stats) -> Self {
        Self {
            username: username.into(),
            stats,
            hp: STARTING_HP,
            max_hp: STARTING_HP,
        }
    }

    /// Set hp, clamped to `[0, max_hp]`. Returns the value actually stored.
    pub fn set_hp(&mut self, hp: i64) -> i32 {
        let max = i64::from(self.max_hp.max(0));
        self.hp = hp.clamp(0, max) as i32;
        self.hp
    }

    /// Restore `0 <= hp <= max_hp` on a record of unknown provenance.
    pub fn normalize(&mut self) {
        if self.max_hp < 0 {
            self.max_hp = 0;
        }
        self.set_hp(i64::from(self.hp));
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no saved character under '{}'", STORAGE_KEY)]
    Missing,
    #[error("saved character is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("session storage error: {0}")]
    Io(#[from] io::Error),
}

/// File-backed key/value storage for the player record.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{STORAGE_KEY}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self) -> Result<PlayerData, SessionError> {
        let raw = match std::fs::read_to_string(self.path()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SessionError::Missing),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() || raw.trim() == "null" {
            return Err(SessionError::Missing);
        }
        let mut player: PlayerData = serde_json::from_str(&raw)?;
        player.normalize();
        Ok(player)
    }

    pub fn save(&self, player: &PlayerData) -> Result<(), SessionError> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(player)?;
        std::fs::write(self.path(), json)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
