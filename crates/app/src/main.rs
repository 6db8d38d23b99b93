use anyhow::{Context, Result};
use conversation::{ControllerEvent, ControllerOptions, ConversationController, MessageStore};
use providers::HttpTransport;
use services::FileStorage;
use shared::settings::ClientSettings;
use shared::ChatMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

mod console_view;
mod simple_md;

use console_view::ConsoleView;

fn settings_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "MindChat", "MindChat")
        .map(|proj| proj.config_dir().join("settings.json"))
}

/// Settings file, then environment, then the first command-line argument as
/// the chat mode.
fn load_settings() -> Result<ClientSettings> {
    let mut settings = match settings_path() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading settings");
            ClientSettings::load(&path)
        }
        None => ClientSettings::default(),
    };
    settings.apply_env_overrides();
    if let Some(raw) = std::env::args().nth(1) {
        settings.mode = raw
            .parse::<ChatMode>()
            .with_context(|| format!("unknown chat mode '{}'", raw))?;
    }
    Ok(settings)
}

/// Map a console line onto a controller event.
fn parse_input(line: &str) -> ControllerEvent {
    let trimmed = line.trim();
    match trimmed {
        "/quit" | "/exit" => ControllerEvent::Shutdown,
        "/reset" | "/new" => ControllerEvent::Reset,
        "/models" => ControllerEvent::LoadModels,
        _ => match trimmed.strip_prefix("/model ") {
            Some(id) => ControllerEvent::SelectModel(id.trim().to_string()),
            None => ControllerEvent::Input(line.to_string()),
        },
    }
}

/// Forward stdin lines to the controller until EOF or a quit command.
async fn read_console(tx: UnboundedSender<ControllerEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let event = parse_input(&line);
                let quitting = matches!(event, ControllerEvent::Shutdown);
                if tx.send(event).is_err() || quitting {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
    let _ = tx.send(ControllerEvent::Shutdown);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings()?;
    let profile = settings.mode.profile(&settings.timing);

    let transport = HttpTransport::new(
        &settings.base_url,
        Duration::from_secs(settings.request_timeout_secs),
    )
    .context("invalid backend address")?;
    tracing::info!(mode = %settings.mode, base_url = transport.base_url(), "starting");

    let store = if profile.persists {
        let dir = FileStorage::default_location().context("no data directory for the session")?;
        let storage = FileStorage::new(dir);
        tracing::debug!(dir = %storage.dir().display(), "session storage");
        MessageStore::durable(Arc::new(storage), settings.session_key.clone())
    } else {
        MessageStore::ephemeral()
    };

    let mut controller = ConversationController::new(
        profile,
        ControllerOptions::from(&settings),
        store,
        Arc::new(transport),
        ConsoleView::stdout(),
    );

    controller.replay_transcript();
    controller.load_model_options();

    tokio::spawn(read_console(controller.sender()));
    controller.run().await;
    tracing::info!("bye");
    Ok(())
}
