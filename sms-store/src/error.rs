use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("phone number already authorized: {0}")]
    DuplicatePhone(String),

    #[error("sender not found")]
    SenderNotFound,

    #[error("attempt not found: {0}")]
    AttemptNotFound(i64),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
