//! Authorization and rate-limit gate.
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! feature flag, sender lookup, enabled flag, hourly window, daily window.
//! Rate-limit windows slide relative to `now` and count persisted attempts
//! regardless of how those attempts ended, so malformed commands still burn
//! budget.

use crate::config::RemoteCommandConfig;
use chrono::{DateTime, Duration, Utc};
use sms_channels::phone;
use sms_store::{AuthorizedSender, SmsStore, StoreError};

/// The gate's view of the store: one lookup collaborator, one history-count
/// collaborator.
pub trait GateStore {
    fn find_sender(&self, phone: &str) -> Result<Option<AuthorizedSender>, StoreError>;
    fn count_attempts_since(&self, phone: &str, since: DateTime<Utc>)
    -> Result<i64, StoreError>;
}

impl GateStore for SmsStore {
    fn find_sender(&self, phone: &str) -> Result<Option<AuthorizedSender>, StoreError> {
        self.find_sender_by_phone(phone)
    }

    fn count_attempts_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        SmsStore::count_attempts_since(self, phone, since)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    FeatureDisabled,
    NotAuthorized,
    SenderDisabled,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed { sender: AuthorizedSender },
    Denied { kind: DenialKind, message: String },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    fn denied(kind: DenialKind, message: impl Into<String>) -> Self {
        Self::Denied {
            kind,
            message: message.into(),
        }
    }
}

pub fn check(
    cfg: &RemoteCommandConfig,
    store: &dyn GateStore,
    sender_phone: &str,
    now: DateTime<Utc>,
) -> GateDecision {
    if !cfg.enabled {
        return GateDecision::denied(
            DenialKind::FeatureDisabled,
            "Remote commands are disabled.",
        );
    }

    let sender = match store.find_sender(sender_phone) {
        Ok(Some(sender)) => sender,
        Ok(None) => {
            tracing::info!(sender = %phone::mask(sender_phone), "sender not authorized");
            return GateDecision::denied(
                DenialKind::NotAuthorized,
                "This number is not authorized for remote commands.",
            );
        }
        Err(e) => {
            // Lookup failure is indistinguishable from "no row"; deny rather
            // than let an unknown number through.
            tracing::warn!(%e, sender = %phone::mask(sender_phone), "sender lookup failed");
            return GateDecision::denied(
                DenialKind::NotAuthorized,
                "This number is not authorized for remote commands.",
            );
        }
    };

    if !sender.is_enabled {
        tracing::info!(sender = %phone::mask(sender_phone), "sender currently disabled");
        return GateDecision::denied(
            DenialKind::SenderDisabled,
            "This number is currently disabled for remote commands.",
        );
    }

    if let Some(denial) = window_exceeded(store, sender_phone, now, Duration::hours(1), cfg.hourly_cap, "hour")
    {
        return denial;
    }
    if let Some(denial) = window_exceeded(store, sender_phone, now, Duration::hours(24), cfg.daily_cap, "day")
    {
        return denial;
    }

    GateDecision::Allowed { sender }
}

/// A store failure during the count fails open: SMS delivery has no retry
/// path back here, so availability wins over strictness.
fn window_exceeded(
    store: &dyn GateStore,
    sender_phone: &str,
    now: DateTime<Utc>,
    window: Duration,
    cap: i64,
    window_name: &str,
) -> Option<GateDecision> {
    match store.count_attempts_since(sender_phone, now - window) {
        Ok(count) if count >= cap => {
            tracing::info!(
                sender = %phone::mask(sender_phone),
                count,
                cap,
                window = window_name,
                "rate limit reached"
            );
            Some(GateDecision::denied(
                DenialKind::RateLimited,
                format!("Rate limit reached: at most {cap} commands per {window_name}."),
            ))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(
                %e,
                sender = %phone::mask(sender_phone),
                window = window_name,
                "rate-limit count failed; allowing command"
            );
            None
        }
    }
}
