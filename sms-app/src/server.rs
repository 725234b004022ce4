//! Long-running gateway service and the one-shot CLI operations.

use crate::config::Config;
use crate::coordinator::Coordinator;
use anyhow::{Context, Result, anyhow};
use chrono::{Duration, Utc};
use sms_channels::{LoopbackTransport, OutboundSms, SimSlot, SmsTransport, phone};
use sms_store::SmsStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = Config::load_with_path(config_path).await?;
    if !cfg.remote_command.enabled {
        tracing::warn!("remote commands are disabled; every command will be rejected");
    }
    let store = open_store(&cfg)?;

    // Loopback is the only built-in transport; real telephony backends plug
    // in behind `SmsTransport`.
    let transport: Arc<dyn SmsTransport> = Arc::new(LoopbackTransport::new());
    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    transport.start(inbound_tx).await?;

    let coordinator = Coordinator::start(cfg.clone(), transport.clone(), store);
    coordinator.spawn_inbound_loop(inbound_rx);

    tracing::info!(
        config_path = %path.display(),
        transport = %transport.transport_id(),
        workers = cfg.runtime.worker_count,
        queue_capacity = cfg.runtime.queue_capacity,
        "smsgate running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    Ok(())
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = Config::load_with_path(config_path).await?;
    let store = open_store(&cfg)?;
    let senders = store.list_senders()?;
    let attempts = store.count_attempts()?;
    tracing::info!(
        config_path = %path.display(),
        db_path = %cfg.runtime.db_path,
        enabled = cfg.remote_command.enabled,
        hourly_cap = cfg.remote_command.hourly_cap,
        daily_cap = cfg.remote_command.daily_cap,
        security_mode = ?cfg.remote_command.security_mode,
        authorized_senders = senders.len(),
        logged_attempts = attempts,
        "config ok"
    );
    Ok(())
}

pub async fn send_one_shot(
    config_path: Option<PathBuf>,
    sim: &str,
    target: &str,
    message: &str,
) -> Result<()> {
    let _ = Config::load(config_path).await?;
    let sim = SimSlot::parse(sim).ok_or_else(|| anyhow!("invalid SIM selector {sim:?}"))?;
    let target = phone::canonicalize(target);
    if !phone::is_valid(&target) {
        return Err(anyhow!("invalid target number"));
    }

    let transport = LoopbackTransport::new();
    let channel = sim.channel_index().unwrap_or(0);
    transport
        .send(channel, &target, OutboundSms::new(message))
        .await?;
    println!("sent via SIM{} to {}", channel + 1, phone::mask(&target));
    Ok(())
}

pub async fn list_senders(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let senders = store.list_senders()?;
    if senders.is_empty() {
        println!("no authorized senders");
        return Ok(());
    }
    for sender in senders {
        println!(
            "{}\t{}\tprimary={}\tenabled={}\tcommands={}\tlast_used={}",
            sender.phone,
            if sender.display_name.is_empty() {
                "-"
            } else {
                &sender.display_name
            },
            sender.is_primary,
            sender.is_enabled,
            sender.command_count,
            sender
                .last_used_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }
    Ok(())
}

pub async fn add_sender(config_path: Option<PathBuf>, raw_phone: &str, name: &str) -> Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let canonical = phone::canonicalize(raw_phone);
    if !phone::is_valid(&canonical) {
        return Err(anyhow!("invalid phone number"));
    }
    let sender = store.add_sender(&canonical, name, Utc::now())?;
    println!("authorized {}", sender.phone);
    Ok(())
}

pub async fn remove_sender(config_path: Option<PathBuf>, raw_phone: &str) -> Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let canonical = phone::canonicalize(raw_phone);
    if store.remove_sender(&canonical)? {
        println!("removed {canonical}");
    } else {
        println!("no such sender {canonical}");
    }
    Ok(())
}

pub async fn set_primary_sender(config_path: Option<PathBuf>, raw_phone: &str) -> Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let canonical = phone::canonicalize(raw_phone);
    let sender = store
        .find_sender_by_phone(&canonical)?
        .with_context(|| format!("no such sender {canonical}"))?;
    store.set_primary(sender.id)?;
    println!("{canonical} is now primary");
    Ok(())
}

pub async fn set_sender_enabled(
    config_path: Option<PathBuf>,
    raw_phone: &str,
    enabled: bool,
) -> Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let canonical = phone::canonicalize(raw_phone);
    if store.set_enabled(&canonical, enabled)? {
        println!(
            "{canonical} {}",
            if enabled { "enabled" } else { "disabled" }
        );
    } else {
        println!("no such sender {canonical}");
    }
    Ok(())
}

pub async fn prune_attempts(config_path: Option<PathBuf>, days: i64) -> Result<()> {
    let cfg = Config::load(config_path).await?;
    let store = open_store(&cfg)?;
    let cutoff = Utc::now() - Duration::days(days);
    let pruned = store.prune_attempts_before(cutoff)?;
    println!("pruned {pruned} attempt(s) older than {days} day(s)");
    Ok(())
}

fn open_store(cfg: &Config) -> Result<Arc<SmsStore>> {
    let db_path = Path::new(&cfg.runtime.db_path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(Arc::new(SmsStore::open(db_path)?))
}
