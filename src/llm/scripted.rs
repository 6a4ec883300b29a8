// Offline narrator: canned keyword-driven replies, no network.

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use super::{ChunkStream, LlmClient, LlmError};
use crate::memory::ConversationTurn;
use crate::protocol::START_GAME;
use crate::scene;

/// Deterministic stand-in for a hosted model. It speaks the same
/// `REQUEST-ROLL:` / `HP:` / `POINTS OF DMG` conventions the system prompt
/// asks real models to use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedNarrator;

impl ScriptedNarrator {
    pub fn new() -> Self {
        Self
    }

    pub fn narrate(&self, prompt: &str) -> String {
        let (endpoint, payload) = split_prompt(prompt);

        if endpoint == Some(START_GAME) {
            let name = payload
                .as_ref()
                .and_then(|p| p["playerData"]["username"].as_str())
                .unwrap_or("traveller");
            return format!(
                "Welcome, {name}! You awaken in a dark, damp cave. A faint light glows \
                 from a tunnel to your north. What do you do?"
            );
        }

        if let Some(roll) = payload
            .as_ref()
            .and_then(|p| p["dice_roll_result"]["roll"].as_i64())
        {
            return if roll > 10 {
                "Success! The goblin is surprised and fumbles his weapon. It's your turn!"
                    .to_string()
            } else {
                "Failure... The goblin is too fast! It lunges at you, dealing 3 POINTS OF DMG."
                    .to_string()
            };
        }

        let text = match &payload {
            Some(p) => p["player_text"].as_str().unwrap_or_default().to_string(),
            None => prompt.to_string(),
        };
        let lower = text.to_lowercase();

        if lower.contains("map") || lower.contains("travel") {
            let destination = payload
                .as_ref()
                .and_then(|p| p["map_selection"].as_str())
                .and_then(scene::map_label)
                .unwrap_or("next town");
            return format!("You set out for the {destination} and arrive as the sun sets.");
        }
        if lower.contains("look") || lower.contains("north") {
            return "You walk north down the tunnel and see a goblin guarding a chest. \
                    He hasn't seen you yet.\nREQUEST-ROLL: Roll for Stealth (Dexterity)"
                .to_string();
        }
        if lower.contains("attack") {
            return "You charge the goblin! It snarls and draws its rusty knife.\n\
                    REQUEST-ROLL: Roll for Initiative (Dexterity)"
                .to_string();
        }
        if lower.contains("rest") {
            return "You rest by the fire and feel your strength return. HP: 100".to_string();
        }

        format!("I don't understand \"{text}\". Try 'look around', 'attack', 'rest' or 'travel'.")
    }
}

/// Split an `endpoint|payload-json` prompt. Plain text yields `(None, None)`.
fn split_prompt(prompt: &str) -> (Option<&str>, Option<Value>) {
    if !prompt.starts_with('/') {
        return (None, None);
    }
    match prompt.split_once('|') {
        Some((endpoint, payload)) => (Some(endpoint), serde_json::from_str(payload).ok()),
        None => (Some(prompt.trim()), None),
    }
}

impl LlmClient for ScriptedNarrator {
    fn provider(&self) -> &'static str {
        "offline"
    }

    fn generate<'a>(
        &'a self,
        _history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        let reply = self.narrate(prompt);
        Box::pin(async move { Ok(reply) })
    }

    fn stream<'a>(
        &'a self,
        _history: &'a [ConversationTurn],
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, LlmError>> {
        let chunks: Vec<Result<String, LlmError>> = self
            .narrate(prompt)
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Box::pin(async move { Ok(stream::iter(chunks).boxed()) })
    }
}
