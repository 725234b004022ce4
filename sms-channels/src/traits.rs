use crate::types::{InboundSms, OutboundSms};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Longest body that fits in a single SMS segment.
pub const SINGLE_SEGMENT_MAX: usize = 160;

/// Characters per part of a concatenated SMS (the UDH header eats the rest).
const CONCAT_SEGMENT_MAX: usize = 153;

#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Unique transport identifier: "loopback", "modem".
    fn transport_id(&self) -> &str;

    /// Start receiving messages. Push to tx for each inbound SMS.
    async fn start(&self, tx: mpsc::Sender<InboundSms>) -> Result<()>;

    /// Send one message part on the given channel (SIM slot index).
    async fn send(&self, channel: u8, recipient: &str, message: OutboundSms) -> Result<()>;

    /// Split a body into transmittable parts. The default split matches GSM
    /// concatenated-SMS sizing; transports with different framing override it.
    fn segment(&self, body: &str) -> Vec<String> {
        if body.chars().count() <= SINGLE_SEGMENT_MAX {
            return vec![body.to_string()];
        }
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut count = 0;
        for ch in body.chars() {
            current.push(ch);
            count += 1;
            if count == CONCAT_SEGMENT_MAX {
                parts.push(std::mem::take(&mut current));
                count = 0;
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        parts
    }
}
