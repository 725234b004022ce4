//! smsgate main binary.

mod config;
mod coordinator;
mod executor;
mod gate;
mod lifecycle;
mod parser;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "smsgate", version, about = "SMS remote-command gateway")]
struct Cli {
    /// Config file path (default: ~/.smsgate/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gateway (default).
    Serve,
    /// Validate config and print a health summary.
    Doctor,
    /// One-shot send through the transport.
    Send {
        /// SIM1, SIM2 or AUTO.
        sim: String,
        target: String,
        message: String,
    },
    /// Manage authorized senders.
    Sender {
        #[command(subcommand)]
        command: SenderCommand,
    },
    /// Delete command attempts older than the given age.
    Prune {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Debug, Subcommand)]
enum SenderCommand {
    /// List authorized senders.
    List,
    /// Authorize a phone number.
    Add {
        phone: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Remove an authorized sender.
    Remove { phone: String },
    /// Make a sender the single primary one.
    SetPrimary { phone: String },
    /// Re-enable a sender.
    Enable { phone: String },
    /// Disable a sender without removing it.
    Disable { phone: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    match command {
        Command::Serve => server::serve(cli.config).await,
        Command::Doctor => server::doctor(cli.config).await,
        Command::Send {
            sim,
            target,
            message,
        } => server::send_one_shot(cli.config, &sim, &target, &message).await,
        Command::Sender { command } => match command {
            SenderCommand::List => server::list_senders(cli.config).await,
            SenderCommand::Add { phone, name } => {
                server::add_sender(cli.config, &phone, &name).await
            }
            SenderCommand::Remove { phone } => server::remove_sender(cli.config, &phone).await,
            SenderCommand::SetPrimary { phone } => {
                server::set_primary_sender(cli.config, &phone).await
            }
            SenderCommand::Enable { phone } => {
                server::set_sender_enabled(cli.config, &phone, true).await
            }
            SenderCommand::Disable { phone } => {
                server::set_sender_enabled(cli.config, &phone, false).await
            }
        },
        Command::Prune { days } => server::prune_attempts(cli.config, days).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("info,smsgate=debug,sms_app=debug,sms_channels=debug,sms_store=debug"),
    };
    let log_format = std::env::var("SMSGATE_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported SMSGATE_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
