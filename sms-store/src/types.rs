use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sms_channels::SimSlot;
use std::fmt;

/// A phone number permitted to issue remote commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedSender {
    pub id: i64,
    /// Canonical form, unique across all rows.
    pub phone: String,
    pub display_name: String,
    /// At most one row holds this at a time.
    pub is_primary: bool,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub command_count: i64,
}

/// Lifecycle state of a command attempt. Stored as text, matched as an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Authorized,
    Executing,
    Success,
    Failed,
    Unauthorized,
    InvalidFormat,
    RateLimited,
    UserDenied,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Executing => "executing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unauthorized => "unauthorized",
            Self::InvalidFormat => "invalid_format",
            Self::RateLimited => "rate_limited",
            Self::UserDenied => "user_denied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "authorized" => Some(Self::Authorized),
            "executing" => Some(Self::Executing),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "unauthorized" => Some(Self::Unauthorized),
            "invalid_format" => Some(Self::InvalidFormat),
            "rate_limited" => Some(Self::RateLimited),
            "user_denied" => Some(Self::UserDenied),
            _ => None,
        }
    }

    /// No further transition is allowed from a terminal state.
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Pending | Self::Authorized | Self::Executing => false,
            Self::Success
            | Self::Failed
            | Self::Unauthorized
            | Self::InvalidFormat
            | Self::RateLimited
            | Self::UserDenied => true,
        }
    }

    pub fn is_in_progress(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row per inbound message recognized as a remote command. Created
/// before any validation runs so rejected attempts still count toward rate
/// limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAttempt {
    pub id: i64,
    pub sender_phone: String,
    pub raw_text: String,
    pub sim: Option<SimSlot>,
    pub target: Option<String>,
    pub message: Option<String>,
    pub status: CommandStatus,
    pub result: Option<String>,
    pub received_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub resulted_at: Option<DateTime<Utc>>,
}

impl CommandAttempt {
    pub fn new(sender_phone: impl Into<String>, raw_text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            sender_phone: sender_phone.into(),
            raw_text: raw_text.into(),
            sim: None,
            target: None,
            message: None,
            status: CommandStatus::Pending,
            result: None,
            received_at,
            executed_at: None,
            resulted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [
            CommandStatus::Pending,
            CommandStatus::Authorized,
            CommandStatus::Executing,
            CommandStatus::Success,
            CommandStatus::Failed,
            CommandStatus::Unauthorized,
            CommandStatus::InvalidFormat,
            CommandStatus::RateLimited,
            CommandStatus::UserDenied,
        ] {
            assert_eq!(CommandStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CommandStatus::parse("running"), None);
    }

    #[test]
    fn terminal_and_progress_predicates_partition_the_states() {
        assert!(CommandStatus::Pending.is_in_progress());
        assert!(CommandStatus::Authorized.is_in_progress());
        assert!(CommandStatus::Executing.is_in_progress());
        for terminal in [
            CommandStatus::Success,
            CommandStatus::Failed,
            CommandStatus::Unauthorized,
            CommandStatus::InvalidFormat,
            CommandStatus::RateLimited,
            CommandStatus::UserDenied,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.is_in_progress());
        }
        assert!(CommandStatus::Success.is_success());
        assert!(!CommandStatus::Failed.is_success());
    }
}
