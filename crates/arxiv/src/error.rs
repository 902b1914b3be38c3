use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArxivError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("arXiv API error: HTTP {status}")]
    Api { status: u16 },

    #[error("malformed Atom feed: {0}")]
    Feed(String),

    #[error("paper store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("paper store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
