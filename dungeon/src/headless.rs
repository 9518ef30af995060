//! Line-oriented driver for the dungeon engine.
//!
//! - Lines starting with `#` are commands (quit, status, sessions, help)
//! - Every other line is a player action
//! - Turn results are printed to stdout; logs go to stderr

use dungeon_core::{GameMaster, Session, SessionError, SessionId};
use std::io::{self, BufRead, Write};

/// How the driver should pick its session.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub campaign_id: String,
    pub prompt: String,
    pub character_id: String,
    pub resume: Option<SessionId>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            campaign_id: "camp_001".to_string(),
            prompt: "a forgotten crypt".to_string(),
            character_id: "hero".to_string(),
            resume: None,
        }
    }
}

/// Parse `--prompt`, `--character`, `--campaign` and `--resume` flags.
pub fn parse_config_from_args(args: &[String]) -> HeadlessConfig {
    let mut config = HeadlessConfig::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--prompt" | "-p" => {
                if let Some(value) = iter.next() {
                    config.prompt = value.clone();
                }
            }
            "--character" | "-c" => {
                if let Some(value) = iter.next() {
                    config.character_id = value.clone();
                }
            }
            "--campaign" => {
                if let Some(value) = iter.next() {
                    config.campaign_id = value.clone();
                }
            }
            "--resume" | "-r" => {
                if let Some(value) = iter.next() {
                    config.resume = Some(SessionId::from(value.as_str()));
                }
            }
            _ => {}
        }
    }

    config
}

/// Run until `#quit` or end of input.
pub async fn run_headless(gm: &GameMaster, config: HeadlessConfig) -> Result<(), SessionError> {
    let session = match &config.resume {
        Some(id) => gm.resume_session(id).await?,
        None => gm.start_session(&config.campaign_id, &config.prompt).await?,
    };
    let session_id = session.session_id.clone();

    println!("=== Dungeon ===");
    println!("Session: {session_id}");
    print_status(&session);
    println!();
    print_commands();
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            match command.split_whitespace().next() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("status") => match gm.store().load(&session_id).await {
                    Ok(session) => print_status(&session),
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("sessions") => match gm.store().list().await {
                    Ok(ids) => {
                        for id in ids {
                            println!("  {id}");
                        }
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("help") => print_commands(),
                _ => println!("[ERROR] Unknown command. Type #help for commands."),
            }
            let _ = stdout.flush();
            continue;
        }

        match gm.play_turn(&session_id, &config.character_id, line).await {
            Ok(outcome) => {
                if let Some(roll) = &outcome.roll {
                    println!("[ROLL] {roll}");
                }
                println!("{}", outcome.description);
            }
            Err(e) => println!("[ERROR] {e}"),
        }
        println!();
        let _ = stdout.flush();
    }

    Ok(())
}

fn print_status(session: &Session) {
    match session.current_room() {
        Ok(room) => {
            println!("[STATUS] {} - {}", session.location_name, room.title);
            println!("{}", room.description());
            let targets = room.valid_targets();
            if !targets.is_empty() {
                println!("You can act on: {}", targets.join(", "));
            }
        }
        Err(e) => println!("[ERROR] {e}"),
    }
}

fn print_commands() {
    println!("Commands:");
    println!("  #quit      - Exit");
    println!("  #status    - Show the current room");
    println!("  #sessions  - List saved sessions");
    println!("  #help      - Show this help");
    println!("Anything else is an action, e.g. 'attack goblin', 'search', 'go north'.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_config_from_args(&args(&["dungeon"]));
        assert_eq!(config.character_id, "hero");
        assert!(config.resume.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let config = parse_config_from_args(&args(&[
            "dungeon",
            "--prompt",
            "dark forest",
            "-c",
            "thorin",
            "--resume",
            "sess_abc",
        ]));
        assert_eq!(config.prompt, "dark forest");
        assert_eq!(config.character_id, "thorin");
        assert_eq!(config.resume, Some(SessionId::from("sess_abc")));
    }
}
