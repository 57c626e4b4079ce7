use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::integrity("expected row is missing"),
        sqlx::Error::ColumnDecode { index, source } => {
            RepoError::integrity(format!("column `{index}` could not be decoded: {source}"))
        }
        sqlx::Error::Database(db) if db.message().contains("invalid input syntax") => {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Decodes a JSON aggregate column into typed rows.
pub(super) fn decode_aggregate<T: DeserializeOwned>(
    column: &'static str,
    value: Value,
) -> Result<Vec<T>, RepoError> {
    match value {
        Value::Null => Ok(Vec::new()),
        value => serde_json::from_value(value).map_err(|err| {
            RepoError::integrity(format!("aggregate `{column}` is malformed: {err}"))
        }),
    }
}
