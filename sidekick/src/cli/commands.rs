//! CLI command execution.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::TryRecvError;

use sidekick::app::{ContextServices, Sidekick};
use sidekick::chat::{ConversationEvent, SessionOutcome};
use sidekick::config::{AppConfig, DeliveryMode};
use sidekick::server;

use super::args::{Cli, Commands};

// === Command Execution ===

pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            serve(config, port).await
        }
        Commands::Ask {
            work_item,
            buffered,
            language,
            prompt,
        } => {
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                bail!("A question is required for ask");
            }
            if let Some(id) = work_item {
                config.work_tracking.current_item_id = Some(id);
            }
            if buffered {
                config.chat.mode = DeliveryMode::Buffered;
            }
            if let Some(language) = language {
                config.chat.language = language;
            }
            ask(config, &prompt).await
        }
        Commands::Context { id, language } => {
            let language = language.unwrap_or_else(|| config.chat.language.clone());
            print_context(&config, id, &language).await
        }
        Commands::Config => show_config(cli.config.as_deref(), &config),
    }
}

async fn serve(config: AppConfig, port: u16) -> Result<()> {
    let app = Sidekick::from_config(config).context("Failed to set up the LLM transport")?;
    server::start_server(Arc::new(app), port).await
}

async fn ask(config: AppConfig, prompt: &str) -> Result<()> {
    let app = Sidekick::from_config(config).context("Failed to set up the LLM transport")?;
    let orchestrator = &app.orchestrator;

    let mut events = orchestrator.subscribe();
    let ticket = orchestrator.send(prompt).await?;
    let message_id = ticket.message_id;
    let finished = ticket.finished();
    tokio::pin!(finished);

    let mut stdout = std::io::stdout();
    let mut printed = false;
    let mut print_delta = |event: ConversationEvent| -> Result<()> {
        if let ConversationEvent::MessageDelta {
            message_id: id,
            delta,
            ..
        } = event
        {
            if id == message_id {
                print!("{delta}");
                stdout.flush()?;
                printed = true;
            }
        }
        Ok(())
    };

    let outcome = loop {
        tokio::select! {
            outcome = &mut finished => break outcome,
            event = events.recv() => {
                if let Ok(event) = event {
                    print_delta(event)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel().await;
            }
        }
    };
    loop {
        match events.try_recv() {
            Ok(event) => print_delta(event)?,
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    let snapshot = orchestrator.snapshot().await;
    let content = snapshot
        .messages
        .iter()
        .find(|m| m.id == message_id)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    match outcome {
        SessionOutcome::Completed => {
            if !printed {
                print!("{content}");
            }
            println!();
            Ok(())
        }
        SessionOutcome::Errored => bail!("{content}"),
        SessionOutcome::Aborted => {
            println!();
            eprintln!("Cancelled.");
            Ok(())
        }
        SessionOutcome::WatchdogExpired => {
            println!();
            bail!("No response before the watchdog deadline")
        }
    }
}

async fn print_context(config: &AppConfig, id: u64, language: &str) -> Result<()> {
    let services = ContextServices::from_config(config);
    let hierarchy = services.switch_work_item(id).await;
    if let Some(current) = &hierarchy.current {
        if current.is_degraded() {
            eprintln!("Warning: work item {id} could only be loaded partially ({:?}).", current.source);
        }
    }
    println!("{}", hierarchy.prompt(language));
    Ok(())
}

fn show_config(path: Option<&std::path::Path>, config: &AppConfig) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::default_path()?,
    };
    let exists = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("# {}{exists}", path.display());
    let rendered = toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
