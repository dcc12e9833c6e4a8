use std::fmt::{self, Display};

use serde::Serialize;
use thiserror::Error;
use warp::{http::StatusCode, reject::Rejection};

/// Failure categories a request can end in. Each one maps to a single
/// response status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlError {
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Already exists")]
    Conflict,
    #[error("Does not exist")]
    Missing,
    #[error("Not found")]
    NotFound,
    #[error("Authentication credentials were not provided")]
    Unauthorized,
    #[error("Invalid session")]
    InvalidSession,
    #[error("You do not have permission to perform this action")]
    Forbidden,
    #[error("Internal server error")]
    InternalServerError,
}

impl HtmlError {
    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: info.to_owned(),
        }
    }

    pub fn default(self) -> Error {
        Error {
            kind: self,
            info: self.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HtmlError::InvalidRequest | HtmlError::Conflict | HtmlError::Missing => {
                StatusCode::BAD_REQUEST
            }
            HtmlError::NotFound => StatusCode::NOT_FOUND,
            HtmlError::Unauthorized | HtmlError::InvalidSession => StatusCode::UNAUTHORIZED,
            HtmlError::Forbidden => StatusCode::FORBIDDEN,
            HtmlError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{info}")]
pub struct Error {
    pub kind: HtmlError,
    pub info: String,
}

impl Error {
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl warp::reject::Reject for Error {}

/// JSON body every failed request is answered with.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}

impl From<&Error> for ErrorBody {
    fn from(value: &Error) -> Self {
        Self {
            detail: value.info.to_owned(),
        }
    }
}

pub struct QueryError {
    kind: HtmlError,
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: HtmlError::InternalServerError,
            info,
        }
    }

    /// Unique violations carry the caller-facing message for the "already
    /// exists" outcome.
    pub fn or_conflict(value: sqlx::Error, info: &str) -> Error {
        let error = Self::from(value);
        match error.kind {
            HtmlError::Conflict => HtmlError::Conflict.new(info),
            _ => error.into(),
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) if e.is_unique_violation() => Self {
                kind: HtmlError::Conflict,
                info: format!("{e}"),
            },
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => Self {
                kind: HtmlError::NotFound,
                info: format!("{e}"),
            },
            sqlx::Error::Database(e) if e.is_check_violation() => Self {
                kind: HtmlError::InvalidRequest,
                info: format!("{e}"),
            },
            sqlx::Error::RowNotFound => Self {
                kind: HtmlError::NotFound,
                info: String::from("RowNotFound"),
            },
            other => Self::new(other.to_string()),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        if value.kind == HtmlError::InternalServerError {
            log::error!("Query failed: {}", value.info);
        }
        Error {
            kind: value.kind,
            info: value.info,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&value.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

impl From<TypeError> for Rejection {
    fn from(value: TypeError) -> Self {
        Error::from(value).into()
    }
}
