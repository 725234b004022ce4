//! Persistence for smsgate: authorized senders and the command-attempt audit
//! log, backed by sqlite.

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::SmsStore;
pub use types::{AuthorizedSender, CommandAttempt, CommandStatus};

pub type Result<T> = std::result::Result<T, StoreError>;
