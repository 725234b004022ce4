//! Ingress coordination: all inbound SMS funnel through here.
//!
//! The delivery path only pays for a prefix test; recognized commands are
//! handed to a bounded worker pool, where the full pipeline (attempt record,
//! gate, parser, executor, response) runs with blocking store and transport
//! calls off any delivery-sensitive thread.

use crate::config::{Config, SecurityMode};
use crate::executor;
use crate::gate::{self, DenialKind, GateDecision, GateStore};
use crate::lifecycle::AttemptLog;
use crate::parser;
use chrono::{DateTime, Utc};
use sms_channels::{InboundSms, OutboundSms, SmsTransport, phone};
use sms_store::{AuthorizedSender, SmsStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Responses and rejections go out on the first SIM.
const RESPONSE_CHANNEL: u8 = 0;

pub struct Coordinator {
    cfg: Config,
    transport: Arc<dyn SmsTransport>,
    store: Arc<SmsStore>,
    log: AttemptLog,
    jobs_tx: mpsc::Sender<InboundSms>,
}

/// The gate's store view for one pipeline run: the attempt logged for the
/// command being gated is excluded from its own rate-limit window.
struct GateView<'a> {
    store: &'a SmsStore,
    current_attempt: i64,
}

impl GateStore for GateView<'_> {
    fn find_sender(&self, phone: &str) -> Result<Option<AuthorizedSender>, StoreError> {
        self.store.find_sender_by_phone(phone)
    }

    fn count_attempts_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.store
            .count_attempts_since_excluding(phone, since, self.current_attempt)
    }
}

impl Coordinator {
    /// Build the coordinator and spawn its worker pool.
    pub fn start(
        cfg: Config,
        transport: Arc<dyn SmsTransport>,
        store: Arc<SmsStore>,
    ) -> Arc<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel(cfg.runtime.queue_capacity.max(1));
        // At least one worker must hold the receiver or offers would all fail
        // against a closed channel.
        let worker_count = cfg.runtime.worker_count.max(1);
        let coordinator = Arc::new(Self {
            log: AttemptLog::new(store.clone()),
            cfg,
            transport,
            store,
            jobs_tx,
        });

        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));
        for worker in 0..worker_count {
            let this = coordinator.clone();
            let rx = jobs_rx.clone();
            tokio::spawn(async move {
                this.worker_loop(worker, rx).await;
            });
        }
        coordinator
    }

    /// Feed every inbound message from `rx` through [`Self::offer`].
    pub fn spawn_inbound_loop(self: &Arc<Self>, mut rx: mpsc::Receiver<InboundSms>) {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                this.offer(inbound);
            }
            tracing::info!("inbound channel closed; ingress loop exiting");
        });
    }

    /// Cheap recognition on the delivery path. Returns true when the message
    /// was accepted as a command job; non-commands and queue overflow return
    /// false.
    pub fn offer(&self, inbound: InboundSms) -> bool {
        if !parser::is_remote_command(&inbound.body) {
            return false;
        }
        match self.jobs_tx.try_send(inbound) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    sender = %phone::mask(&dropped.sender),
                    "command queue full; dropping command"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("command queue closed; dropping command");
                false
            }
        }
    }

    async fn worker_loop(
        &self,
        worker: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<InboundSms>>>,
    ) {
        loop {
            let job = {
                let mut rx = rx.lock().await;
                rx.recv().await
            };
            let Some(inbound) = job else {
                tracing::debug!(worker, "job queue closed; worker exiting");
                return;
            };
            self.process(inbound).await;
        }
    }

    /// The full per-command pipeline. Every branch lands the attempt in a
    /// terminal state and, when configured, answers the sender.
    pub(crate) async fn process(&self, inbound: InboundSms) {
        let sender_phone = phone::canonicalize(&inbound.sender);
        let mut attempt = self
            .log
            .create(&sender_phone, &inbound.body, inbound.received_at);
        let cfg = &self.cfg.remote_command;

        let gate_view = GateView {
            store: &self.store,
            current_attempt: attempt.id,
        };
        let sender = match gate::check(cfg, &gate_view, &sender_phone, Utc::now()) {
            GateDecision::Denied { kind, message } => {
                match kind {
                    DenialKind::RateLimited => {
                        self.log.mark_rate_limited(&mut attempt, &message, Utc::now());
                    }
                    DenialKind::FeatureDisabled
                    | DenialKind::NotAuthorized
                    | DenialKind::SenderDisabled => {
                        self.log.mark_unauthorized(&mut attempt, &message, Utc::now());
                    }
                }
                self.respond(&sender_phone, false, &message, false).await;
                return;
            }
            GateDecision::Allowed { sender } => sender,
        };

        let parsed = match parser::parse(&inbound.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                let reason = e.to_string();
                self.log.mark_invalid_format(&mut attempt, &reason, Utc::now());
                self.respond(&sender_phone, false, &reason, true).await;
                return;
            }
        };

        self.log.mark_authorized(&mut attempt, &parsed);

        if cfg.security_mode == SecurityMode::Confirm {
            tracing::warn!(
                attempt_id = attempt.id,
                "confirm mode is not implemented; executing immediately"
            );
        }

        let outcome = executor::execute(
            self.transport.as_ref(),
            self.store.clone(),
            &self.log,
            &mut attempt,
            &parsed,
            &sender,
        )
        .await;
        self.respond(&sender_phone, outcome.success, &outcome.result, false)
            .await;
    }

    /// Best-effort outcome SMS back to the command's sender.
    async fn respond(&self, recipient: &str, success: bool, text: &str, include_help: bool) {
        if !self.cfg.remote_command.send_responses {
            return;
        }
        let marker = if success { "OK" } else { "ERROR" };
        let mut body = format!("{marker}: {text}");
        if include_help {
            body.push('\n');
            body.push_str(parser::HELP_TEXT);
        }
        if let Err(e) = self
            .transport
            .send(RESPONSE_CHANNEL, recipient, OutboundSms::new(body))
            .await
        {
            tracing::warn!(
                %e,
                recipient = %phone::mask(recipient),
                "failed to send response SMS"
            );
        }
    }
}
