//! Command attempt lifecycle tracking.
//!
//! `AttemptLog` owns the state machine over [`CommandAttempt`]:
//!
//! ```text
//! Pending -> Authorized -> Executing -> Success | Failed
//! Pending -> Unauthorized | InvalidFormat | RateLimited | UserDenied
//! ```
//!
//! Transitions only advance, and a terminal status never changes again. Store
//! failures are logged and swallowed; the in-memory record stays
//! authoritative for the rest of the pipeline run, so a broken audit log
//! never blocks the response path.

use crate::parser::ParsedCommand;
use chrono::{DateTime, Utc};
use sms_channels::phone;
use sms_store::{CommandAttempt, CommandStatus, SmsStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AttemptLog {
    store: Arc<SmsStore>,
}

impl AttemptLog {
    pub fn new(store: Arc<SmsStore>) -> Self {
        Self { store }
    }

    /// Record a freshly received command as `Pending`, before any validation
    /// runs. If the insert fails the attempt continues in memory only.
    pub fn create(
        &self,
        sender_phone: &str,
        raw_text: &str,
        received_at: DateTime<Utc>,
    ) -> CommandAttempt {
        let mut attempt = CommandAttempt::new(sender_phone, raw_text, received_at);
        if let Err(e) = self.store.insert_attempt(&mut attempt) {
            tracing::warn!(
                %e,
                sender = %phone::mask(sender_phone),
                "failed to persist command attempt; continuing unlogged"
            );
        }
        attempt
    }

    pub fn mark_authorized(&self, attempt: &mut CommandAttempt, parsed: &ParsedCommand) {
        if !self.advance(attempt, CommandStatus::Pending, CommandStatus::Authorized) {
            return;
        }
        attempt.sim = Some(parsed.sim);
        attempt.target = Some(parsed.target.clone());
        attempt.message = Some(parsed.message.clone());
        self.persist(attempt);
    }

    pub fn mark_executing(&self, attempt: &mut CommandAttempt, now: DateTime<Utc>) {
        if !self.advance(attempt, CommandStatus::Authorized, CommandStatus::Executing) {
            return;
        }
        attempt.executed_at = Some(now);
        self.persist(attempt);
    }

    pub fn mark_success(&self, attempt: &mut CommandAttempt, result: &str, now: DateTime<Utc>) {
        if !self.advance(attempt, CommandStatus::Executing, CommandStatus::Success) {
            return;
        }
        attempt.result = Some(result.to_string());
        attempt.resulted_at = Some(now);
        self.persist(attempt);
    }

    pub fn mark_failed(&self, attempt: &mut CommandAttempt, result: &str, now: DateTime<Utc>) {
        if !self.advance(attempt, CommandStatus::Executing, CommandStatus::Failed) {
            return;
        }
        attempt.result = Some(result.to_string());
        attempt.resulted_at = Some(now);
        self.persist(attempt);
    }

    pub fn mark_unauthorized(&self, attempt: &mut CommandAttempt, reason: &str, now: DateTime<Utc>) {
        self.reject(attempt, CommandStatus::Unauthorized, Some(reason), now);
    }

    pub fn mark_invalid_format(&self, attempt: &mut CommandAttempt, reason: &str, now: DateTime<Utc>) {
        self.reject(attempt, CommandStatus::InvalidFormat, Some(reason), now);
    }

    pub fn mark_rate_limited(&self, attempt: &mut CommandAttempt, reason: &str, now: DateTime<Utc>) {
        self.reject(attempt, CommandStatus::RateLimited, Some(reason), now);
    }

    pub fn mark_user_denied(&self, attempt: &mut CommandAttempt, now: DateTime<Utc>) {
        self.reject(attempt, CommandStatus::UserDenied, None, now);
    }

    /// Pending -> terminal rejection.
    fn reject(
        &self,
        attempt: &mut CommandAttempt,
        status: CommandStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) {
        if !self.advance(attempt, CommandStatus::Pending, status) {
            return;
        }
        attempt.result = reason.map(str::to_string);
        attempt.resulted_at = Some(now);
        self.persist(attempt);
    }

    /// Apply a transition if the attempt is in the expected source state.
    /// Terminal records are never touched; out-of-order transitions are
    /// logged and ignored rather than corrupting the record.
    fn advance(&self, attempt: &mut CommandAttempt, from: CommandStatus, to: CommandStatus) -> bool {
        if attempt.status.is_terminal() {
            tracing::warn!(
                attempt_id = attempt.id,
                current = %attempt.status,
                requested = %to,
                "ignoring transition on terminal attempt"
            );
            return false;
        }
        if attempt.status != from {
            tracing::warn!(
                attempt_id = attempt.id,
                current = %attempt.status,
                requested = %to,
                "ignoring out-of-order transition"
            );
            return false;
        }
        attempt.status = to;
        true
    }

    fn persist(&self, attempt: &CommandAttempt) {
        if let Err(e) = self.store.update_attempt(attempt) {
            tracing::warn!(
                %e,
                attempt_id = attempt.id,
                status = %attempt.status,
                "failed to persist attempt update"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sms_channels::SimSlot;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    fn log() -> (AttemptLog, Arc<SmsStore>) {
        let store = Arc::new(SmsStore::open_in_memory().expect("store"));
        (AttemptLog::new(store.clone()), store)
    }

    fn parsed() -> ParsedCommand {
        ParsedCommand {
            sim: SimSlot::Sim1,
            target: "+905557654321".to_string(),
            message: "hello".to_string(),
        }
    }

    #[test]
    fn create_persists_a_pending_record() {
        let (log, store) = log();
        let attempt = log.create("+905551234567", "SMS SIM1 +905557654321 hello", now());
        assert_eq!(attempt.status, CommandStatus::Pending);
        assert!(attempt.id > 0);

        let stored = store
            .get_attempt(attempt.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored.status, CommandStatus::Pending);
        assert_eq!(stored.sim, None);
    }

    #[test]
    fn happy_path_walks_the_full_chain() {
        let (log, store) = log();
        let mut attempt = log.create("+905551234567", "SMS SIM1 +905557654321 hello", now());

        log.mark_authorized(&mut attempt, &parsed());
        assert_eq!(attempt.status, CommandStatus::Authorized);
        assert_eq!(attempt.sim, Some(SimSlot::Sim1));
        assert_eq!(attempt.target.as_deref(), Some("+905557654321"));

        log.mark_executing(&mut attempt, now() + Duration::seconds(1));
        assert_eq!(attempt.status, CommandStatus::Executing);
        assert_eq!(attempt.executed_at, Some(now() + Duration::seconds(1)));

        log.mark_success(&mut attempt, "sent via SIM1", now() + Duration::seconds(2));
        assert_eq!(attempt.status, CommandStatus::Success);
        assert!(attempt.status.is_success());
        assert_eq!(attempt.result.as_deref(), Some("sent via SIM1"));
        assert_eq!(attempt.resulted_at, Some(now() + Duration::seconds(2)));

        let stored = store
            .get_attempt(attempt.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored, attempt);
    }

    #[test]
    fn terminal_status_is_never_overwritten() {
        let (log, store) = log();
        let mut attempt = log.create("+905551234567", "SMS", now());
        log.mark_unauthorized(&mut attempt, "not authorized", now());
        assert_eq!(attempt.status, CommandStatus::Unauthorized);

        // A later pipeline stage misfiring must not move the record.
        log.mark_authorized(&mut attempt, &parsed());
        log.mark_executing(&mut attempt, now());
        log.mark_success(&mut attempt, "late", now());
        log.mark_failed(&mut attempt, "late", now());
        assert_eq!(attempt.status, CommandStatus::Unauthorized);
        assert_eq!(attempt.result.as_deref(), Some("not authorized"));

        let stored = store
            .get_attempt(attempt.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored.status, CommandStatus::Unauthorized);
    }

    #[test]
    fn transitions_cannot_skip_states() {
        let (log, _) = log();
        let mut attempt = log.create("+905551234567", "SMS", now());

        // Executing requires Authorized first.
        log.mark_executing(&mut attempt, now());
        assert_eq!(attempt.status, CommandStatus::Pending);

        // Success requires Executing first.
        log.mark_authorized(&mut attempt, &parsed());
        log.mark_success(&mut attempt, "early", now());
        assert_eq!(attempt.status, CommandStatus::Authorized);
    }

    #[test]
    fn every_rejection_is_terminal_with_a_result_stamp() {
        let (log, _) = log();

        let mut a = log.create("+905551234567", "SMS", now());
        log.mark_invalid_format(&mut a, "missing parameters", now());
        assert_eq!(a.status, CommandStatus::InvalidFormat);
        assert_eq!(a.result.as_deref(), Some("missing parameters"));
        assert!(a.resulted_at.is_some());

        let mut b = log.create("+905551234567", "SMS", now());
        log.mark_rate_limited(&mut b, "too many commands", now());
        assert_eq!(b.status, CommandStatus::RateLimited);

        let mut c = log.create("+905551234567", "SMS", now());
        log.mark_user_denied(&mut c, now());
        assert_eq!(c.status, CommandStatus::UserDenied);
        assert_eq!(c.result, None);
        assert!(c.resulted_at.is_some());

        for attempt in [&a, &b, &c] {
            assert!(attempt.status.is_terminal());
            assert!(!attempt.status.is_in_progress());
        }
    }

    #[test]
    fn failed_send_lands_in_failed_with_the_error_text() {
        let (log, _) = log();
        let mut attempt = log.create("+905551234567", "SMS", now());
        log.mark_authorized(&mut attempt, &parsed());
        log.mark_executing(&mut attempt, now());
        log.mark_failed(&mut attempt, "modem timeout", now() + Duration::seconds(3));
        assert_eq!(attempt.status, CommandStatus::Failed);
        assert_eq!(attempt.result.as_deref(), Some("modem timeout"));
        assert!(!attempt.status.is_success());
    }
}
