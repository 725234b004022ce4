//! Command execution: SIM resolution, segmented send, result reporting.

use crate::lifecycle::AttemptLog;
use crate::parser::ParsedCommand;
use chrono::Utc;
use sms_channels::{OutboundSms, SINGLE_SEGMENT_MAX, SmsTransport, phone};
use sms_store::{AuthorizedSender, CommandAttempt, SmsStore};
use std::sync::Arc;

/// Channel used when the command asks for `AUTO`. The transport exposes no
/// carrier or signal data to choose from, so auto selection falls back to the
/// first SIM.
const AUTO_FALLBACK_CHANNEL: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: String,
}

/// Run an authorized, parsed command to its terminal state. Never returns an
/// error: every failure ends as a `Failed` attempt plus an outcome the caller
/// can report back to the sender.
pub async fn execute(
    transport: &dyn SmsTransport,
    store: Arc<SmsStore>,
    log: &AttemptLog,
    attempt: &mut CommandAttempt,
    parsed: &ParsedCommand,
    sender: &AuthorizedSender,
) -> ExecutionOutcome {
    log.mark_executing(attempt, Utc::now());

    let channel = parsed.sim.channel_index().unwrap_or(AUTO_FALLBACK_CHANNEL);
    tracing::info!(
        attempt_id = attempt.id,
        sim = %parsed.sim,
        channel,
        target = %phone::mask(&parsed.target),
        "executing remote send"
    );

    match send_all(transport, channel, &parsed.target, &parsed.message).await {
        Ok(()) => {
            let result = format!("Message sent via SIM{}", channel + 1);
            log.mark_success(attempt, &result, Utc::now());
            spawn_usage_update(store, sender.phone.clone());
            ExecutionOutcome {
                success: true,
                result,
            }
        }
        Err(e) => {
            let result = e.to_string();
            tracing::warn!(
                attempt_id = attempt.id,
                error = %result,
                target = %phone::mask(&parsed.target),
                "remote send failed"
            );
            log.mark_failed(attempt, &result, Utc::now());
            ExecutionOutcome {
                success: false,
                result,
            }
        }
    }
}

/// Bodies over one segment go through the transport's own splitter and are
/// sent part by part; a failure mid-way surfaces as the command's failure.
async fn send_all(
    transport: &dyn SmsTransport,
    channel: u8,
    target: &str,
    message: &str,
) -> anyhow::Result<()> {
    if message.chars().count() > SINGLE_SEGMENT_MAX {
        for part in transport.segment(message) {
            transport
                .send(channel, target, OutboundSms::new(part))
                .await?;
        }
        return Ok(());
    }
    transport
        .send(channel, target, OutboundSms::new(message))
        .await
}

/// Usage counters are bookkeeping; update them off the command's own path
/// and only log when the update fails.
fn spawn_usage_update(store: Arc<SmsStore>, sender_phone: String) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = store.increment_usage(&sender_phone, Utc::now()) {
            tracing::warn!(
                %e,
                sender = %phone::mask(&sender_phone),
                "failed to update sender usage counters"
            );
        }
    });
}
