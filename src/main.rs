#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use sessionward::{
    settings::SessionwardSettings, FileTokenStore, GoTrueProvider, SessionManager,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = SessionwardSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let provider = GoTrueProvider::from_settings(&settings.provider)
        .map_err(|e| std::io::Error::other(format!("Failed to initialize provider: {e}")))?;
    let token_store = FileTokenStore::new(&settings.session.token_path);

    print_startup_info(&settings);

    let manager = SessionManager::new(
        Arc::new(provider),
        Arc::new(token_store),
        settings.session.clone(),
    );
    run(manager).await
}

/// Supervise the session until Ctrl-C
///
/// # Errors
///
/// Returns an error if the shutdown signal cannot be installed
async fn run(manager: SessionManager) -> std::io::Result<()> {
    manager
        .subscribe(|state| match &state.user {
            Some(user) => log::info!(
                "State: signed in as {} <{}> (loading: {})",
                user.name,
                user.email.as_deref().unwrap_or("-"),
                state.loading
            ),
            None => log::info!(
                "State: signed out (initialized: {}, loading: {})",
                state.initialized,
                state.loading
            ),
        })
        .detach();
    manager.register_navigator(|path| log::info!("➡️  Navigation requested: {path}"));

    manager.initialize().await;

    if !manager.is_authenticated() {
        if let Some((email, password)) = credentials_from_env() {
            if let Err(err) = manager.login(&email, &password).await {
                log::error!("Login failed: {}", err.user_message());
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown signal received");
    manager.shutdown();
    Ok(())
}

fn credentials_from_env() -> Option<(String, String)> {
    let email = std::env::var("SESSIONWARD_EMAIL").ok()?;
    let password = std::env::var("SESSIONWARD_PASSWORD").ok()?;
    Some((email, password))
}

fn print_startup_info(settings: &SessionwardSettings) {
    println!("🚀 Starting sessionward v{}", sessionward::VERSION);
    println!("🔗 Identity provider: {}", settings.provider.url);
    println!("💾 Access token file: {}", settings.session.token_path);
    println!(
        "⏱️  Refresh check every {}s, {}s before expiry",
        settings.session.refresh_check_interval_secs, settings.session.refresh_buffer_secs
    );
    if let Some(session_file) = &settings.provider.session_file {
        println!("📁 Provider session file: {session_file}");
    }
}
