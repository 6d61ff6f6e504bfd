pub mod models;
pub mod websocket;
pub mod config;
pub mod cli;
pub mod history;
pub mod connection;
pub mod console;
pub mod error;
pub mod identity;

use cli::Args;
use config::prefs::JsonFilePreferences;
use connection::ConnectionManager;
use identity::{ ConfiguredIdentity, IdentityProvider };
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use websocket::TungsteniteConnector;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Chat Configuration ---");
    info!("Endpoint: {}", args.endpoint);
    info!("Reconnect Attempts: {}", args.max_attempts);
    info!("Reconnect Delay: {}ms", args.retry_delay_ms);
    info!(
        "Send Wait: {} x {}ms",
        args.connect_poll_checks,
        args.connect_poll_interval_ms
    );
    info!("Frame Format: {:?}", args.frame_format);
    info!("Preferences Path: {}", args.prefs_path);
    info!("-------------------------");

    let identity = Arc::new(ConfiguredIdentity::new(args.user.clone()));
    if !*identity.is_authenticated().borrow() {
        warn!("No signed-in user. Pass --user or set CHAT_USER to start chatting.");
        return Err("not authenticated".into());
    }
    info!("Signed in as {}", identity.user().unwrap_or_default());

    let prefs = JsonFilePreferences::load_or_default(&args.prefs_path);
    let handle = ConnectionManager::spawn(args.manager_config(), Arc::new(TungsteniteConnector));
    console::run_console(handle, identity, Box::new(prefs)).await?;

    Ok(())
}
