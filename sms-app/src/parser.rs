//! Remote command parser.
//!
//! Grammar: `<PREFIX> <SIM> <NUMBER> <MESSAGE...>` where the message is the
//! whole remainder after the number, whitespace included. Validation stops at
//! the first failure; every error renders the text sent back to the sender.

use sms_channels::{SimSlot, phone};
use thiserror::Error;

/// Accepted command prefixes, matched case-insensitively.
pub const COMMAND_PREFIXES: [&str; 2] = ["SMS", "SENDSMS"];

/// Upper bound for the message body; multi-part delivery covers up to ten
/// concatenated segments.
pub const MAX_MESSAGE_LEN: usize = 1600;

pub const HELP_TEXT: &str =
    "Format: SMS <SIM1|SIM2|AUTO> <number> <message>\nExample: SMS SIM1 +905551234567 Hello";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command prefix; accepted prefixes: SMS, SENDSMS")]
    UnknownPrefix,

    #[error("missing command body; expected: <SIM1|SIM2|AUTO> <number> <message>")]
    MissingBody,

    #[error("missing parameters; expected: <SIM1|SIM2|AUTO> <number> <message>")]
    MissingParameters,

    #[error("invalid SIM selector {0:?}; valid values: SIM1, SIM2, AUTO")]
    InvalidSim(String),

    #[error("invalid target number")]
    InvalidTarget,

    #[error("empty message body")]
    EmptyMessage,

    #[error("message is too long: {0} characters (limit 1600)")]
    MessageTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub sim: SimSlot,
    /// Canonical form of the destination number.
    pub target: String,
    pub message: String,
}

/// Cheap recognizer run on the delivery path: does the first token match an
/// accepted prefix? Non-commands never enter the pipeline.
pub fn is_remote_command(text: &str) -> bool {
    strip_prefix(text.trim()).is_some()
}

pub fn parse(text: &str) -> Result<ParsedCommand, ParseError> {
    // Only the start is trimmed: a trailing separator means the message
    // position exists but is blank, which is a different error than a
    // missing position.
    let input = text.trim_start();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let remainder = strip_prefix(input).ok_or(ParseError::UnknownPrefix)?;
    let remainder = remainder.trim_start();
    if remainder.is_empty() {
        return Err(ParseError::MissingBody);
    }

    let (sim_token, rest) = split_token(remainder).ok_or(ParseError::MissingParameters)?;
    let (target_token, message) = split_token(rest).ok_or(ParseError::MissingParameters)?;

    let sim = SimSlot::parse(sim_token)
        .ok_or_else(|| ParseError::InvalidSim(sim_token.to_string()))?;

    let target = phone::canonicalize(target_token);
    if !phone::is_valid(&target) {
        return Err(ParseError::InvalidTarget);
    }

    if message.trim().is_empty() {
        return Err(ParseError::EmptyMessage);
    }
    let len = message.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(ParseError::MessageTooLong(len));
    }

    Ok(ParsedCommand {
        sim,
        target,
        message: message.to_string(),
    })
}

/// Strip an accepted prefix followed by whitespace (or end of input) and
/// return the remainder.
fn strip_prefix(input: &str) -> Option<&str> {
    let input = input.trim_start();
    let first = input.split_whitespace().next()?;
    if !COMMAND_PREFIXES
        .iter()
        .any(|prefix| first.eq_ignore_ascii_case(prefix))
    {
        return None;
    }
    Some(&input[first.len()..])
}

/// Split off the next whitespace-delimited token. `None` means no separator
/// followed the token, i.e. the next position is structurally missing; a
/// blank remainder after a separator is returned as an empty string so the
/// caller can tell "missing" from "blank".
fn split_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    let end = input.find(char::is_whitespace)?;
    Some((&input[..end], input[end..].trim_start()))
}
