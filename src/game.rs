// Client-side game loop: player actions out, interpreted narration back in.

use rand::Rng;
use serde_json::{json, Value};
use thiserror::Error;

use crate::interpreter::{self, HpChange};
use crate::protocol::{AiRequest, PLAYER_ACTION, START_GAME};
use crate::scene;
use crate::session::{PlayerData, SessionError, SessionStore};
use crate::transport::{Transport, TransportError};

pub const SPEAKER_PLAYER: &str = "You";
pub const SPEAKER_NARRATOR: &str = "Game Master";
pub const SPEAKER_SYSTEM: &str = "System";

#[derive(Debug, Error)]
pub enum GameError {
    #[error("no character found, create one first ({0})")]
    NoCharacter(SessionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("waiting for a dice roll")]
    AwaitingRoll,
    #[error("no roll has been requested")]
    NoRollPending,
    #[error("nothing to send")]
    EmptyInput,
    #[error("unknown map '{0}'")]
    UnknownMap(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub speaker: &'static str,
    pub text: String,
}

/// What a single turn did to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub narrative: String,
    pub roll_requested: bool,
    pub roll_reason: Option<String>,
    pub hp_changes: Vec<HpChange>,
    pub hp: i32,
}

pub struct GameSession {
    player: PlayerData,
    store: SessionStore,
    transport: Box<dyn Transport>,
    player_id: Option<String>,
    roll_reason: Option<String>,
    log: Vec<LogEntry>,
}

impl GameSession {
    /// Resume the character saved in `store`.
    pub fn new(store: SessionStore, transport: Box<dyn Transport>) -> Result<Self, GameError> {
        let player = match store.load() {
            Ok(player) => player,
            Err(e @ (SessionError::Missing | SessionError::Corrupt(_))) => {
                return Err(GameError::NoCharacter(e))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            player,
            store,
            transport,
            player_id: None,
            roll_reason: None,
            log: Vec::new(),
        })
    }

    /// Keep this session's conversation separate from other players on the
    /// same server.
    pub fn with_player_id(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn player(&self) -> &PlayerData {
        &self.player
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn waiting_for_roll(&self) -> bool {
        self.roll_reason.is_some()
    }

    pub fn roll_reason(&self) -> Option<&str> {
        self.roll_reason.as_deref()
    }

    pub async fn start(&mut self) -> Result<TurnOutcome, GameError> {
        let payload = json!({ "playerData": self.player });
        self.take_turn(START_GAME, payload).await
    }

    pub async fn submit_text(&mut self, text: &str) -> Result<TurnOutcome, GameError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::EmptyInput);
        }
        if self.waiting_for_roll() {
            return Err(GameError::AwaitingRoll);
        }
        self.push_log(SPEAKER_PLAYER, text);
        let payload = json!({
            "player_text": text,
            "current_stats": self.player,
        });
        self.take_turn(PLAYER_ACTION, payload).await
    }

    pub async fn roll_dice<R: Rng>(&mut self, rng: &mut R) -> Result<TurnOutcome, GameError> {
        let reason = self.roll_reason.clone().ok_or(GameError::NoRollPending)?;
        let roll: u32 = rng.gen_range(1..=20);
        self.push_log(SPEAKER_SYSTEM, format!("You rolled a {roll} for \"{reason}\"."));

        let payload = json!({
            "dice_roll_result": { "reason": reason, "roll": roll },
            "current_stats": self.player,
        });
        self.take_turn(PLAYER_ACTION, payload).await
    }

    pub async fn select_map(&mut self, map: &str) -> Result<TurnOutcome, GameError> {
        let label = scene::map_label(map).ok_or_else(|| GameError::UnknownMap(map.to_string()))?;
        let text = format!("I want to travel to the {label}.");
        self.push_log(SPEAKER_PLAYER, text.as_str());

        let payload = json!({
            "player_text": text,
            "current_stats": self.player,
            "map_selection": map,
        });
        self.take_turn(PLAYER_ACTION, payload).await
    }

    async fn take_turn(
        &mut self,
        endpoint: &str,
        payload: Value,
    ) -> Result<TurnOutcome, GameError> {
        let request = AiRequest::action(endpoint, payload, self.player_id.clone());
        let narrative = self.transport.exchange(&request).await?;

        let reading = interpreter::interpret(&narrative);
        let hp_changes = interpreter::apply_hp(&mut self.player, &reading.hp_directives);
        if !hp_changes.is_empty() {
            self.store.save(&self.player)?;
            tracing::debug!(hp = self.player.hp, "player health updated");
        }

        self.push_log(SPEAKER_NARRATOR, narrative.as_str());
        for change in &hp_changes {
            self.push_log(SPEAKER_SYSTEM, format!("HP {} -> {}", change.before, change.after));
        }
        self.roll_reason = reading.roll_reason.clone();

        Ok(TurnOutcome {
            narrative,
            roll_requested: reading.roll_requested,
            roll_reason: reading.roll_reason,
            hp_changes,
            hp: self.player.hp,
        })
    }

    fn push_log(&mut self, speaker: &'static str, text: impl Into<String>) {
        self.log.push(LogEntry {
            speaker,
            text: text.into(),
        });
    }
}
