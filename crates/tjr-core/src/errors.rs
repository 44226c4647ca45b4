/// Core error type for the relay.
///
/// Domain variants are rendered into chat replies by the dispatcher; ambient variants
/// (`Config`, `Io`, `Json`, `External`) surface at startup or in adapter logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("user not found: {0}")]
    UnknownUser(String),

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("invalid token")]
    InvalidToken,

    #[error("token has already been used")]
    TokenAlreadyUsed,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("already logged in")]
    AlreadyLoggedIn,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("permission denied")]
    PermissionDenied,

    #[error("unknown product: {0}")]
    UnknownProduct(String),

    #[error("invalid command")]
    InvalidCommand,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
