#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("no database pool is being managed")]
    MissingPool,
    #[error("no transaction is open for this request")]
    NoTransaction,
}

#[derive(thiserror::Error, Debug)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
    #[error("token lifetime {0} is out of range")]
    Lifetime(chrono::TimeDelta),
}
