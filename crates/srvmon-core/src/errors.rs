/// Core error type for the bot.
///
/// The transport adapter maps its specific errors into `Transport` so call
/// sites can treat any send/edit/delete failure as a logged no-op, and the
/// collaborators (metrics, log read, source-control pull) map theirs into
/// `Collaborator` so command handlers can surface them as error-text replies.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
