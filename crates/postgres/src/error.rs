use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    #[error("connection unavailable: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("{}", describe(.0))]
    Query(#[from] tokio_postgres::Error),
}

/// Server-side errors carry a severity and message worth showing in full;
/// everything else falls back to the driver's own text
fn describe(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => {
            let mut text = format!("{}: {}", db.severity(), db.message());
            if let Some(detail) = db.detail() {
                text.push_str(&format!("\nDetail: {}", detail));
            }
            if let Some(hint) = db.hint() {
                text.push_str(&format!("\nHint: {}", hint));
            }
            text
        }
        None => error.to_string(),
    }
}
