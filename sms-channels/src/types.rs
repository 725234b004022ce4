use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(MessageId);
id_newtype!(TransportId);

/// SIM slot selector carried by a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimSlot {
    Sim1,
    Sim2,
    Auto,
}

impl SimSlot {
    /// Concrete channel index for this slot, or `None` when the caller
    /// should pick one (`Auto`).
    pub fn channel_index(self) -> Option<u8> {
        match self {
            Self::Sim1 => Some(0),
            Self::Sim2 => Some(1),
            Self::Auto => None,
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "SIM1" => Some(Self::Sim1),
            "SIM2" => Some(Self::Sim2),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sim1 => "SIM1",
            Self::Sim2 => "SIM2",
            Self::Auto => "AUTO",
        }
    }
}

impl fmt::Display for SimSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SMS delivered by a transport. `sender` is whatever identifier the
/// transport supplies; callers canonicalize it before trusting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSms {
    pub message_id: MessageId,
    pub transport_id: TransportId,
    pub sender: String,
    pub body: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundSms {
    pub body: String,
    #[serde(default)]
    pub reply_to_message_id: Option<MessageId>,
}

impl OutboundSms {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            reply_to_message_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_slot_parses_case_insensitively() {
        assert_eq!(SimSlot::parse("sim1"), Some(SimSlot::Sim1));
        assert_eq!(SimSlot::parse("Sim2"), Some(SimSlot::Sim2));
        assert_eq!(SimSlot::parse("AUTO"), Some(SimSlot::Auto));
        assert_eq!(SimSlot::parse("SIM3"), None);
        assert_eq!(SimSlot::parse(""), None);
    }

    #[test]
    fn explicit_slots_map_to_fixed_channels() {
        assert_eq!(SimSlot::Sim1.channel_index(), Some(0));
        assert_eq!(SimSlot::Sim2.channel_index(), Some(1));
        assert_eq!(SimSlot::Auto.channel_index(), None);
    }
}
