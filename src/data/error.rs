use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Exists(String),
    #[error("{0} references a missing row")]
    MissingReference(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_exists(&self) -> bool {
        matches!(self, Self::Exists(_))
    }

    /// Map constraint violations onto their domain meaning.
    ///
    /// `what` names the row being written, for the error message.
    pub fn classify(err: sqlx::Error, what: impl Into<String>) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());
        match code.as_deref() {
            Some("23505") => Self::Exists(what.into()),
            Some("23503") => Self::MissingReference(what.into()),
            _ => Self::Database(err),
        }
    }
}
