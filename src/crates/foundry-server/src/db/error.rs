//! Database error classification

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("row not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound)
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DatabaseError::Constraint(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed") => {
                DatabaseError::Constraint(db.message().to_string())
            }
            other => DatabaseError::Sqlx(other),
        }
    }
}
