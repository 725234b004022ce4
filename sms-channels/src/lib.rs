//! Transport boundary for smsgate.
//!
//! Transports are pure I/O: they convert telephony events to/from
//! `InboundSms` / `OutboundSms`. Everything that decides what to do with a
//! message lives above this crate.

mod loopback;
pub mod phone;
mod traits;
mod types;

pub use loopback::{LoopbackTransport, SentSms};
pub use traits::{SINGLE_SEGMENT_MAX, SmsTransport};
pub use types::{InboundSms, MessageId, OutboundSms, SimSlot, TransportId};
