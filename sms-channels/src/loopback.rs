use crate::traits::SmsTransport;
use crate::types::{InboundSms, MessageId, OutboundSms, TransportId};
use anyhow::{Result, anyhow};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-process transport for dev runs and tests. Sends are recorded instead of
/// hitting a modem; inbound messages are injected by the caller.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    sent: Arc<Mutex<Vec<SentSms>>>,
    fail_sends: Arc<Mutex<bool>>,
    inbound_tx: Arc<Mutex<Option<mpsc::Sender<InboundSms>>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub channel: u8,
    pub recipient: String,
    pub body: String,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `send` fail, for exercising failure paths.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_sends.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Inject an inbound SMS as if it arrived from the network. Fails if the
    /// transport was never started.
    pub async fn inject(&self, sender: &str, body: &str) -> Result<()> {
        let tx = self
            .inbound_tx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("loopback transport not started"))?;
        tx.send(InboundSms {
            message_id: MessageId::new(Uuid::new_v4().to_string()),
            transport_id: TransportId::new("loopback"),
            sender: sender.to_string(),
            body: body.to_string(),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        })
        .await
        .map_err(|_| anyhow!("inbound queue closed"))
    }
}

#[async_trait::async_trait]
impl SmsTransport for LoopbackTransport {
    fn transport_id(&self) -> &str {
        "loopback"
    }

    async fn start(&self, tx: mpsc::Sender<InboundSms>) -> Result<()> {
        *self
            .inbound_tx
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(tx);
        Ok(())
    }

    async fn send(&self, channel: u8, recipient: &str, message: OutboundSms) -> Result<()> {
        if *self.fail_sends.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(anyhow!("loopback send failure (simulated)"));
        }
        if recipient.trim().is_empty() {
            return Err(anyhow!("recipient is required"));
        }
        tracing::debug!(
            channel,
            recipient = %crate::phone::mask(recipient),
            len = message.body.chars().count(),
            "loopback send recorded"
        );
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(SentSms {
                channel,
                recipient: recipient.to_string(),
                body: message.body,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_is_recorded() {
        let transport = LoopbackTransport::new();
        transport
            .send(0, "+905551234567", OutboundSms::new("hi"))
            .await
            .expect("send");
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, 0);
        assert_eq!(sent[0].recipient, "+905551234567");
        assert_eq!(sent[0].body, "hi");
    }

    #[tokio::test]
    async fn failing_mode_surfaces_errors() {
        let transport = LoopbackTransport::new();
        transport.set_failing(true);
        let err = transport
            .send(0, "+905551234567", OutboundSms::new("hi"))
            .await
            .expect_err("send should fail");
        assert!(err.to_string().contains("simulated"));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn inject_requires_start() {
        let transport = LoopbackTransport::new();
        assert!(transport.inject("+905551234567", "hi").await.is_err());

        let (tx, mut rx) = mpsc::channel(4);
        transport.start(tx).await.expect("start");
        transport
            .inject("+905551234567", "hello")
            .await
            .expect("inject");
        let inbound = rx.recv().await.expect("inbound");
        assert_eq!(inbound.sender, "+905551234567");
        assert_eq!(inbound.body, "hello");
        assert_eq!(inbound.transport_id.as_str(), "loopback");
    }
}
