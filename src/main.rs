//! Reconcile update entities with What's Up Docker and trigger updates
mod cli;

use crate::cli::configure_cli;
use env_logger::Env;
use log::{info, warn};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;
use wud_bridge::config::load_config;
use wud_bridge::dashboard::{Dashboard, DashboardView};
use wud_bridge::gate::now_ms;
use wud_bridge::models::HostStates;
use wud_bridge::notifications::{EventHandler, start_event_handler};
use wud_bridge::reconciler::UpdateAction;
use wud_bridge::wud::WudClient;

fn read_states(path: &Path) -> Result<HostStates, Box<dyn Error + 'static>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn log_view(view: &DashboardView) {
    info!(
        "{} ({:?}): {} update(s) available, {} up-to-date",
        view.title, view.connectivity, view.updates_count, view.current_count
    );
    for entity in &view.updates {
        let action = match &entity.action {
            UpdateAction::Hidden => String::new(),
            UpdateAction::Unavailable => " [no trigger]".to_string(),
            UpdateAction::Single(trigger) => format!(" [trigger {}]", trigger.id),
            UpdateAction::Menu(triggers) => format!(" [{} triggers]", triggers.len()),
        };
        info!(
            "  {} {} -> {}{}{}",
            entity.name,
            entity.installed_version.as_deref().unwrap_or("?"),
            entity.latest_version.as_deref().unwrap_or("latest"),
            if entity.is_updating { " (updating)" } else { "" },
            action
        );
        if let Some(link) = &entity.release_notes {
            info!("    release notes: {link}");
        }
    }
    for entity in &view.current {
        info!(
            "  {} {} (up-to-date)",
            entity.name,
            entity.installed_version.as_deref().unwrap_or("")
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + 'static>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = configure_cli();
    let config = Arc::new(load_config(&args.config_path)?);

    let (tx_events, rx_events) = mpsc::channel(32);
    let event_task = tokio::spawn(async move {
        start_event_handler(rx_events).await;
    });

    let api = match &config.wud_api {
        Some(api_config) => Some(Arc::new(WudClient::new(api_config)?)),
        None => {
            info!("WUD API not configured, update actions disabled");
            None
        }
    };
    let mut dashboard = Dashboard::new(config.clone(), api, Arc::new(EventHandler::new(tx_events)));

    info!("Starting wud-bridge");
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        info!("Received shutdown signal, gracefully shutting down...");
    })?;

    if args.check {
        let checked = dashboard
            .check_for_updates(now_ms())
            .await
            .inspect_err(|e| warn!("check for updates failed: {e}"));
        // a single run has no later host update to pick up the check result
        if checked.is_ok() && args.interval.is_none() {
            sleep(dashboard.settle_delay()).await;
        }
    }

    let mut pending_update = args.update.clone();
    loop {
        let started = Instant::now();
        match read_states(&args.states_path) {
            Ok(states) => {
                let mut view = dashboard.on_host_update(&states, now_ms()).await;
                if let Some((entity_id, trigger_id)) = pending_update.take() {
                    let _ = dashboard
                        .trigger_update(&entity_id, &trigger_id)
                        .await
                        .inspect_err(|e| warn!("update of {entity_id} failed: {e}"));
                    view = Some(dashboard.view().await);
                }
                if let Some(view) = view {
                    if args.json {
                        println!("{}", serde_json::to_string_pretty(&view)?);
                    } else {
                        log_view(&view);
                    }
                }
            }
            Err(e) => warn!("failed to read host states from {:?}: {e}", args.states_path),
        }

        let Some(interval) = args.interval else {
            break;
        };
        while running.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(interval) {
            sleep(Duration::from_millis(500)).await;
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }

    drop(dashboard);
    event_task.await?;
    Ok(())
}
