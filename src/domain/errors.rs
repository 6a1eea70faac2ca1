use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Upstream unavailable: {0}")]
    Upstream(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DispatchError::NotFound("record".to_string()),
            _ => DispatchError::Upstream(format!("database error: {}", err)),
        }
    }
}
