use crate::config::prefs::{ PreferenceStore, Theme };
use crate::connection::{ ChatHandle, ConnectionState };
use crate::error::ChatError;
use crate::history::format_transcript;
use crate::identity::IdentityProvider;
use crate::models::chat::{ ChatSnapshot, Message, Origin };

use log::{ debug, error, warn };
use std::error::Error;
use std::sync::{ Arc, Mutex };
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio_stream::{ wrappers::WatchStream, StreamExt };

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Submit(String),
    New,
    Reconnect,
    Theme,
    Logout,
    Quit,
    History,
    Help,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    match trimmed {
        "/new" => ConsoleCommand::New,
        "/reconnect" => ConsoleCommand::Reconnect,
        "/theme" => ConsoleCommand::Theme,
        "/logout" => ConsoleCommand::Logout,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        "/history" => ConsoleCommand::History,
        "/help" => ConsoleCommand::Help,
        cmd if cmd.starts_with('/') && !cmd.contains(' ') => ConsoleCommand::Unknown(cmd.to_string()),
        _ => ConsoleCommand::Submit(line.to_string()),
    }
}

const HELP: &str = "Commands: /new  /history  /reconnect  /theme  /logout  /quit";

fn paint(theme: Theme, origin: Origin, text: &str) -> String {
    let code = match (theme, origin) {
        (Theme::Light, Origin::User) => "34",
        (Theme::Light, Origin::Remote) => "35",
        (Theme::Dark, Origin::User) => "96",
        (Theme::Dark, Origin::Remote) => "95",
    };
    format!("\x1b[{}m{}\x1b[0m", code, text)
}

fn render_message(theme: Theme, message: &Message) -> String {
    let label = match message.origin() {
        Origin::User => "you",
        Origin::Remote => "assistant",
    };
    format!(
        "[{}] {}: {}",
        message.timestamp().format("%H:%M"),
        paint(theme, message.origin(), label),
        message.content()
    )
}

/// Lines to print when the view moves from `prev` to `next`.
pub fn render_update(prev: &ChatSnapshot, next: &ChatSnapshot, theme: Theme) -> Vec<String> {
    let mut lines = Vec::new();

    if next.state != prev.state {
        let note = match next.state {
            ConnectionState::Open => "connected".to_string(),
            ConnectionState::Connecting => "connecting...".to_string(),
            ConnectionState::Closed =>
                format!("connection dropped, retry {} scheduled", next.retry_attempts),
            ConnectionState::Idle => "disconnected".to_string(),
        };
        lines.push(format!("-- {} --", note));
    }

    let shares_prefix =
        next.messages.len() >= prev.messages.len() &&
        prev.messages
            .iter()
            .zip(next.messages.iter())
            .all(|(a, b)| a.id() == b.id());
    let fresh = if shares_prefix {
        &next.messages[prev.messages.len()..]
    } else {
        lines.push("-- new conversation --".to_string());
        &next.messages[..]
    };
    lines.extend(fresh.iter().map(|m| render_message(theme, m)));

    if next.pending && !prev.pending {
        lines.push("assistant is thinking...".to_string());
    }
    lines
}

/// Line-oriented front end on stdin/stdout. It only forwards input to the
/// chat handle and prints what the snapshot stream reports.
pub async fn run_console(
    handle: ChatHandle,
    identity: Arc<dyn IdentityProvider>,
    prefs: Box<dyn PreferenceStore>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let prefs = Arc::new(Mutex::new(prefs));
    let theme_prefs = Arc::clone(&prefs);

    let mut snapshots = WatchStream::new(handle.subscribe());
    let renderer = tokio::spawn(async move {
        let mut shown = ChatSnapshot::default();
        while let Some(next) = snapshots.next().await {
            let theme = match theme_prefs.lock() {
                Ok(store) => Theme::load(&**store),
                Err(_) => Theme::Light,
            };
            for line in render_update(&shown, &next, theme) {
                println!("{}", line);
            }
            shown = next;
        }
    });

    let mut authenticated = identity.is_authenticated();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);
    handle.start_new().await?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            changed = authenticated.changed() => {
                if changed.is_err() || !*authenticated.borrow() {
                    warn!("Signed out, closing chat session");
                    break;
                }
                continue;
            }
        };
        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };

        match parse_line(&line) {
            ConsoleCommand::Submit(text) => {
                match handle.submit(&text).await {
                    Ok(()) | Err(ChatError::EmptyMessage) => {}
                    // Already reported in the conversation.
                    Err(ChatError::NotConnected) => {}
                    Err(e @ ChatError::ManagerStopped) => {
                        error!("{}", e);
                        break;
                    }
                }
            }
            ConsoleCommand::New => handle.start_new().await?,
            ConsoleCommand::Reconnect => handle.reconnect()?,
            ConsoleCommand::Theme => {
                let toggled = match prefs.lock() {
                    Ok(mut store) => Theme::toggle(&mut **store).map_err(|e| e.to_string()),
                    Err(_) => Err("preference store poisoned".to_string()),
                };
                match toggled {
                    Ok(theme) => println!("-- theme: {} --", theme.as_str()),
                    Err(e) => warn!("Could not save theme: {}", e),
                }
            }
            ConsoleCommand::Logout => {
                handle.teardown().await;
                identity.sign_out().await?;
                println!("-- signed out --");
                break;
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::History => print!("{}", format_transcript(&handle.snapshot().messages)),
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Unknown(cmd) => println!("unknown command {} ({})", cmd, HELP),
        }
    }

    handle.teardown().await;
    renderer.abort();
    Ok(())
}
