//! Terminal front-end
//!
//! Reads lines from stdin and prints coordinator events to stdout.

use chatter_net::{ChatService, CoordinatorEvent};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::cli::Mode;
use crate::config::PlayerConfig;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    Ping,
    Leave,
    Close,
    Network(bool),
    Quit,
    Help,
    Unknown(String),
}

/// Parse an input line. Blank lines yield nothing.
pub fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let Some(command) = line.strip_prefix('/') else {
        return Some(Input::Chat(line.to_string()));
    };

    let mut words = command.split_whitespace();
    let input = match (words.next(), words.next()) {
        (Some("ping"), None) => Input::Ping,
        (Some("leave"), None) => Input::Leave,
        (Some("close"), None) => Input::Close,
        (Some("quit"), None) => Input::Quit,
        (Some("help"), None) => Input::Help,
        (Some("network"), Some("on")) => Input::Network(true),
        (Some("network"), Some("off")) => Input::Network(false),
        // A doubled slash sends the rest literally
        _ if command.starts_with('/') => Input::Chat(command.to_string()),
        _ => Input::Unknown(command.to_string()),
    };
    Some(input)
}

const HELP: &str = "commands: /ping /leave /close /network on|off /quit /help (//text sends \"/text\")";

/// Render an event for the terminal
pub fn describe(event: &CoordinatorEvent) -> String {
    match event {
        CoordinatorEvent::NetworkReady => "network ready".to_string(),
        CoordinatorEvent::NetworkUnavailable => "network unavailable".to_string(),
        CoordinatorEvent::MultiplayerEnabled => "multiplayer enabled".to_string(),
        CoordinatorEvent::MultiplayerDisabled => "multiplayer disabled".to_string(),
        CoordinatorEvent::ServerStarted { ip, port } => {
            format!("hosting on {} port {}", ip, port)
        }
        CoordinatorEvent::ServerError(e) => format!("server error: {}", e),
        CoordinatorEvent::ServerClosed => "server closed".to_string(),
        CoordinatorEvent::PeerConnected(name) => format!("{} joined", name),
        CoordinatorEvent::PeerDisconnected(Some(name)) => format!("{} left", name),
        CoordinatorEvent::PeerDisconnected(None) => "peer disconnected".to_string(),
        CoordinatorEvent::JoinSucceeded(name) => format!("joined {}", name),
        CoordinatorEvent::JoinError(e) => format!("join error: {}", e),
        CoordinatorEvent::LeftGame => "left".to_string(),
        CoordinatorEvent::MessageSent => String::new(),
        CoordinatorEvent::MessageReceived(text) => format!("> {}", text),
        CoordinatorEvent::GeneralError(e) => format!("error: {}", e),
        CoordinatorEvent::Pong(ms) if *ms < 0 => "unexpected pong".to_string(),
        CoordinatorEvent::Pong(ms) => format!("pong {} ms", ms),
    }
}

/// Events after which the chosen mode has nothing left to do
fn is_final(mode: &Mode, event: &CoordinatorEvent) -> bool {
    match mode {
        Mode::Host => matches!(
            event,
            CoordinatorEvent::ServerClosed | CoordinatorEvent::ServerError(_)
        ),
        Mode::Join { .. } => matches!(
            event,
            CoordinatorEvent::LeftGame | CoordinatorEvent::JoinError(_)
        ),
    }
}

fn print_event(event: &CoordinatorEvent) {
    let text = describe(event);
    if !text.is_empty() {
        println!("[{}] {}", Local::now().format("%H:%M:%S"), text);
    }
}

/// Start the requested mode and pump stdin/events until done
pub async fn run(
    mut service: ChatService,
    mode: Mode,
    player: PlayerConfig,
) -> chatter_net::Result<()> {
    match &mode {
        Mode::Host => service.start_server(&player.name, &player.password).await?,
        Mode::Join { ip, port } => {
            service
                .join_game(&player.name, ip, port, &player.password)
                .await?
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed");
                        stdin_open = false;
                        service.close_connection().await?;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                        continue;
                    }
                };

                match parse_input(&line) {
                    None => {}
                    Some(Input::Chat(text)) => service.send_message(&text).await?,
                    Some(Input::Ping) => service.ping().await?,
                    Some(Input::Leave) => service.leave_game().await?,
                    Some(Input::Close) => service.close_server().await?,
                    Some(Input::Network(available)) => service.network().set(available),
                    Some(Input::Help) => println!("{}", HELP),
                    Some(Input::Unknown(cmd)) => println!("unknown command /{} ({})", cmd, HELP),
                    Some(Input::Quit) => {
                        service.close_connection().await?;
                    }
                }
            }

            event = service.next_event() => {
                let Some(event) = event else {
                    break;
                };
                print_event(&event);
                if is_final(&mode, &event) {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatter_net::{GeneralError, JoinError};

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("/ping"), Some(Input::Ping));
        assert_eq!(parse_input("/leave\n"), Some(Input::Leave));
        assert_eq!(parse_input("/network on"), Some(Input::Network(true)));
        assert_eq!(parse_input("/network off"), Some(Input::Network(false)));
        assert_eq!(parse_input("/quit"), Some(Input::Quit));
        assert_eq!(
            parse_input("/network maybe"),
            Some(Input::Unknown("network maybe".into()))
        );
    }

    #[test]
    fn test_parse_chat() {
        assert_eq!(parse_input("   "), None);
        assert_eq!(
            parse_input("hello  there"),
            Some(Input::Chat("hello  there".into()))
        );
        assert_eq!(
            parse_input("//ping is a command"),
            Some(Input::Chat("/ping is a command".into()))
        );
    }

    #[test]
    fn test_describe_events() {
        assert_eq!(describe(&CoordinatorEvent::Pong(-1)), "unexpected pong");
        assert_eq!(describe(&CoordinatorEvent::Pong(12)), "pong 12 ms");
        assert_eq!(
            describe(&CoordinatorEvent::GeneralError(GeneralError::MessageEmpty)),
            "error: Cannot send empty message"
        );
        assert_eq!(
            describe(&CoordinatorEvent::JoinError(JoinError::ServerNotTrusted)),
            "join error: Server is not trusted, not connecting"
        );
        assert!(describe(&CoordinatorEvent::MessageSent).is_empty());
    }

    #[test]
    fn test_final_events_per_mode() {
        let join = Mode::Join {
            ip: "10.0.0.1".into(),
            port: "4000".into(),
        };
        assert!(is_final(&Mode::Host, &CoordinatorEvent::ServerClosed));
        assert!(!is_final(&Mode::Host, &CoordinatorEvent::PeerDisconnected(None)));
        assert!(is_final(&join, &CoordinatorEvent::LeftGame));
        assert!(!is_final(&join, &CoordinatorEvent::ServerClosed));
    }
}
