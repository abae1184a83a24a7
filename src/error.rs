//! Provides the [`Error`] type shared by every layer of the action pipeline.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt::{Display, Formatter};

/// Error type for the action pipeline.
///
/// Every variant maps to exactly one HTTP status code through
/// [`Error::status_code`], and every variant has a user-visible [`Display`]
/// message naming the collection, id, or field that triggered it wherever
/// that information is available.
#[derive(Debug)]
pub enum Error {
    /// A payload did not match the schema derived from the model for the
    /// action it was submitted to.
    Schema { message: String },

    /// A business rule of the action pipeline was violated: an unknown id,
    /// a missing relation target, an attempt to overwrite a non-empty
    /// single-valued reverse relation, a cascade with no registered delete
    /// action, a structured relation used in reverse, and so on.
    Action { message: String },

    /// The caller's organisation-, committee-, or group-level permissions
    /// did not satisfy what the action requires. `required` names the
    /// permission that was missing.
    Permission { required: String },

    /// The incoming request could not be authenticated.
    Auth { message: String },

    /// The datastore rejected the request, either because the optimistic
    /// concurrency check failed (a locked field advanced past the position
    /// this request observed) or because of a transport-level failure.
    Datastore { message: String, transport: bool },

    /// An action name in a batch did not match any registered action.
    UnknownAction { name: String },
}

impl Error {
    pub fn schema(message: impl Into<String>) -> Error {
        Error::Schema { message: message.into() }
    }

    pub fn action(message: impl Into<String>) -> Error {
        Error::Action { message: message.into() }
    }

    pub fn permission(required: impl Into<String>) -> Error {
        Error::Permission { required: required.into() }
    }

    pub fn auth(message: impl Into<String>) -> Error {
        Error::Auth { message: message.into() }
    }

    pub fn datastore_rejected(message: impl Into<String>) -> Error {
        Error::Datastore { message: message.into(), transport: false }
    }

    pub fn datastore_transport(message: impl Into<String>) -> Error {
        Error::Datastore { message: message.into(), transport: true }
    }

    /// The HTTP status code this error is reported with, per the error
    /// taxonomy: schema/business/lock-reject errors are 400, auth is 401,
    /// permission is 403, and transport failure is the only 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Schema { .. } => 400,
            Error::Action { .. } => 400,
            Error::UnknownAction { .. } => 400,
            Error::Permission { .. } => 403,
            Error::Auth { .. } => 401,
            Error::Datastore { transport, .. } => {
                if *transport {
                    500
                } else {
                    400
                }
            }
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Error::Schema { message } => write!(f, "{}", message),
            Error::Action { message } => write!(f, "{}", message),
            Error::Permission { required } => {
                write!(f, "Missing permission: {}", required)
            }
            Error::Auth { message } => write!(f, "{}", message),
            Error::Datastore { message, .. } => write!(f, "{}", message),
            Error::UnknownAction { name } => {
                write!(f, "Action {} does not exist.", name)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Error {
        Error::datastore_transport(format!("Datastore request failed: {}", source))
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Error {
        Error::schema(format!("Payload could not be parsed as JSON: {}", source))
    }
}

/// Lets `actix-web` turn a bare `Result<_, Error>` returned from a handler
/// into the `{"message": "..."}` response the HTTP surface promises.
impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        let body = json!({ "message": self.to_string() });
        match self.status_code() {
            401 => HttpResponse::Unauthorized().json(body),
            403 => HttpResponse::Forbidden().json(body),
            500 => HttpResponse::InternalServerError().json(body),
            _ => HttpResponse::BadRequest().json(body),
        }
    }
}
