// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::memory::{DEFAULT_MAX_PLAYERS, DEFAULT_MAX_TURNS};

/// Game-master instructions sent to the model ahead of every conversation.
/// The conventions named here are the ones the response interpreter scans for.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the Game Master of a fantasy text RPG. \
Narrate vividly in a few sentences and end by asking the player what they do. \
When the story needs a dice check, write a line of the form \
'REQUEST-ROLL: <reason>' and stop. When the player's health changes, write \
'HP: <new value>' or '<n> POINTS OF DMG'.";

/// Which hosted LLM vendor answers player actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
    /// Deterministic keyword narrator, no network access.
    Offline,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Offline => "scripted",
        }
    }

    /// Environment variable holding the vendor API key.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Offline => None,
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "offline" | "scripted" => Ok(Provider::Offline),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::OpenAi => write!(f, "openai"),
            Provider::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown LLM provider '{0}' (expected gemini, openai or offline)")]
    UnknownProvider(String),
    #[error("invalid value '{value}' for {name}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: String,
    /// Base URL of an OpenAI-compatible API.
    pub openai_base_url: String,
    /// Primary directory of static front-end files.
    pub static_dir: PathBuf,
    /// Fallback directory of static files, consulted after `static_dir`.
    pub views_dir: PathBuf,
    /// Directory holding GLB model assets, served under `/models`.
    pub models_dir: PathBuf,
    /// Conversation turns kept per player.
    pub memory_max_turns: usize,
    /// Distinct player ids tracked before the least recently used is evicted.
    pub memory_max_players: usize,
    pub system_prompt: String,
}

impl Config {
    /// Load configuration from the process environment and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 8080)
    /// - `LLM_PROVIDER` - `gemini`, `openai` or `offline` (default: `gemini`)
    /// - `GEMINI_API_KEY` / `OPENAI_API_KEY` - vendor credentials
    /// - `LLM_MODEL` - model name (default depends on provider)
    /// - `OPENAI_BASE_URL` - OpenAI-compatible endpoint (default: `https://api.openai.com`)
    /// - `STATIC_DIR`, `VIEWS_DIR`, `MODELS_DIR` - static asset locations
    /// - `MEMORY_MAX_TURNS`, `MEMORY_MAX_PLAYERS` - conversation memory bounds
    /// - `SYSTEM_PROMPT` - game-master instructions
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--provider <NAME>` - Override the provider
    /// - `--offline` - Same as `--provider offline`
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |name| std::env::var(name).ok())
    }

    /// Build a configuration from explicit arguments and an environment lookup.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port: CLI flag --port takes precedence, then env var, then default
        let port = match Self::parse_cli_value(args, "--port").or_else(|| env("PORT")) {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber {
                name: "PORT",
                value: v,
            })?,
            None => 8080,
        };

        let provider = if args.iter().any(|a| a == "--offline") {
            Provider::Offline
        } else {
            Self::parse_cli_value(args, "--provider")
                .or_else(|| env("LLM_PROVIDER"))
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(Provider::Gemini)
        };

        let api_key = provider
            .api_key_var()
            .and_then(|var| env(var))
            .filter(|k| !k.trim().is_empty());

        let model = env("LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string());

        let openai_base_url =
            env("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com".to_string());

        let static_dir = env("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("public"));
        let views_dir = env("VIEWS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("views"));
        let models_dir = env("MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| static_dir.join("models"));

        let memory_max_turns =
            Self::parse_usize(&env, "MEMORY_MAX_TURNS")?.unwrap_or(DEFAULT_MAX_TURNS);
        let memory_max_players =
            Self::parse_usize(&env, "MEMORY_MAX_PLAYERS")?.unwrap_or(DEFAULT_MAX_PLAYERS);

        let system_prompt =
            env("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Config {
            port,
            provider,
            api_key,
            model,
            openai_base_url,
            static_dir,
            views_dir,
            models_dir,
            memory_max_turns,
            memory_max_players,
            system_prompt,
        })
    }

    /// Parse a CLI flag value like `--port 8080`.
    pub fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    fn parse_usize<F>(env: &F, name: &'static str) -> Result<Option<usize>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match env(name) {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(ConfigError::InvalidNumber { name, value: v }),
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&["rpg-narrator"], &[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.model, "gemini-2.5-flash");
        assert!(config.api_key.is_none());
        assert_eq!(config.memory_max_turns, 10);
        assert_eq!(config.models_dir, PathBuf::from("public/models"));
    }

    #[test]
    fn test_cli_port_overrides_env() {
        let config = load(&["rpg-narrator", "--port", "9000"], &[("PORT", "7000")]).unwrap();
        assert_eq!(config.port, 9000);

        let config = load(&["rpg-narrator"], &[("PORT", "7000")]).unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_provider_selects_key_and_model() {
        let config = load(
            &["rpg-narrator", "--provider", "openai"],
            &[("OPENAI_API_KEY", "sk-test"), ("GEMINI_API_KEY", "g-test")],
        )
        .unwrap();
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn test_offline_flag() {
        let config = load(&["rpg-narrator", "--offline"], &[("LLM_PROVIDER", "openai")]).unwrap();
        assert_eq!(config.provider, Provider::Offline);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            load(&["rpg-narrator"], &[("LLM_PROVIDER", "claude")]),
            Err(ConfigError::UnknownProvider(_))
        ));
        assert!(matches!(
            load(&["rpg-narrator"], &[("MEMORY_MAX_TURNS", "0")]),
            Err(ConfigError::InvalidNumber { name: "MEMORY_MAX_TURNS", .. })
        ));
        assert!(load(&["rpg-narrator", "--port", "http"], &[]).is_err());
    }
}
