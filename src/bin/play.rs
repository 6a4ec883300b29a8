// Terminal client: play a session against a running narrator server.
//
// Usage:
//   rpg-play [--server URL] [--stream] [--session-dir DIR] [--player-id ID]
//   rpg-play --create NAME STR DEX INT [--session-dir DIR]
//
// In game: free text is an action, `roll` rolls the pending d20,
// `map <name>` travels, `maps` lists destinations, `quit` leaves.

use std::io::Write;

use rand::thread_rng;
use tokio::io::{AsyncBufReadExt, BufReader};

use rpg_narrator::config::Config;
use rpg_narrator::game::{GameError, GameSession, TurnOutcome};
use rpg_narrator::interpreter::HpDirective;
use rpg_narrator::scene;
use rpg_narrator::session::{PlayerData, SessionStore, Stats};
use rpg_narrator::transport::{HttpTransport, Transport, WsTransport};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    let server = Config::parse_cli_value(&args, "--server")
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let session_dir = Config::parse_cli_value(&args, "--session-dir").unwrap_or_else(|| ".".into());
    let store = SessionStore::new(session_dir);

    if let Some(pos) = args.iter().position(|a| a == "--create") {
        if let Err(e) = create_character(&store, &args[pos + 1..]) {
            eprintln!("{e}");
            std::process::exit(2);
        }
        return;
    }

    let streaming = args.iter().any(|a| a == "--stream");
    let transport: Box<dyn Transport> = if streaming {
        Box::new(WsTransport::new(&server).with_chunk_handler(|chunk| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }))
    } else {
        Box::new(HttpTransport::new(&server))
    };

    let mut game = match GameSession::new(store, transport) {
        Ok(game) => game,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Create a character with: rpg-play --create NAME STR DEX INT");
            std::process::exit(1);
        }
    };
    if let Some(player_id) = Config::parse_cli_value(&args, "--player-id") {
        game = game.with_player_id(player_id);
    }
    tracing::info!(%server, streaming, "starting game");

    let player = game.player();
    println!(
        "{} (STR {} DEX {} INT {}) HP {}/{}",
        player.username,
        player.stats.str,
        player.stats.dex,
        player.stats.int,
        player.hp,
        player.max_hp
    );
    report(game.start().await, streaming);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&game);
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("failed to read input: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match line.split_once(' ').unwrap_or((line, "")) {
            ("quit" | "exit", _) => break,
            ("roll", _) => game.roll_dice(&mut thread_rng()).await,
            ("maps", _) => {
                for (id, label) in scene::MAPS {
                    println!("  {id:<20} {label}");
                }
                continue;
            }
            ("map", name) => game.select_map(name.trim()).await,
            _ => game.submit_text(line).await,
        };
        report(result, streaming);
    }
}

fn create_character(store: &SessionStore, args: &[String]) -> Result<(), String> {
    let [name, str_, dex, int, ..] = args else {
        return Err("usage: rpg-play --create NAME STR DEX INT".to_string());
    };
    let stat = |label: &str, value: &str| {
        value
            .parse::<i32>()
            .map_err(|_| format!("{label} must be a number, got '{value}'"))
    };
    let stats = Stats {
        str: stat("STR", str_)?,
        dex: stat("DEX", dex)?,
        int: stat("INT", int)?,
    };
    let player = PlayerData::create(name.as_str(), stats);
    store.save(&player).map_err(|e| e.to_string())?;
    println!(
        "Created {} with {} HP, saved to {}",
        player.username,
        player.hp,
        store.path().display()
    );
    Ok(())
}

fn prompt(game: &GameSession) {
    match game.roll_reason() {
        Some(reason) => print!("[{reason}] type 'roll' > "),
        None => print!("> "),
    }
    let _ = std::io::stdout().flush();
}

fn report(result: Result<TurnOutcome, GameError>, streamed: bool) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("! {e}");
            return;
        }
    };
    if streamed {
        println!();
    } else {
        println!("Game Master: {}", outcome.narrative);
    }
    for change in &outcome.hp_changes {
        match change.directive {
            HpDirective::Damage(n) => {
                println!("  You take {n} damage ({} -> {})", change.before, change.after)
            }
            HpDirective::Set(_) | HpDirective::SetOutOf100(_) => {
                println!("  HP {} -> {}", change.before, change.after)
            }
        }
    }
    if outcome.roll_requested {
        println!("  Roll requested: {}", outcome.roll_reason.unwrap_or_default());
    }
}
