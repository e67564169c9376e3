//
// Error kinds, one per outcome the external interface distinguishes.
// Unlike a per-source-type error enum, each variant here is a semantic
// outcome (see the error handling design) carrying only the message shown
// to the caller; the underlying cause (if any) is logged at the `From` site
// and discarded, since callers never need to match on it.
//
use std::io::Cursor;

use rocket::{
    http::{ContentType, Status},
    request::Request,
    response::{self, Responder, Response},
};
use serde_json::Value;

#[derive(Debug)]
pub enum Error {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    SmsCooldown(String),
    UserExists(String),
    Internal(String),
}

impl Error {
    pub fn new<M: Into<String>>(msg: M) -> Self {
        Error::BadRequest(msg.into())
    }

    fn status(&self) -> Status {
        match self {
            Error::Unauthorized(_) => Status::Unauthorized,
            Error::Forbidden(_) => Status::Forbidden,
            Error::BadRequest(_) => Status::BadRequest,
            Error::NotFound(_) => Status::NotFound,
            Error::SmsCooldown(_) => Status::ServiceUnavailable,
            Error::UserExists(_) => Status::BadRequest,
            Error::Internal(_) => Status::InternalServerError,
        }
    }

    fn message(&self) -> &str {
        match self {
            Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::BadRequest(m)
            | Error::NotFound(m)
            | Error::SmsCooldown(m)
            | Error::UserExists(m)
            | Error::Internal(m) => m,
        }
    }

    fn body(&self) -> Value {
        json!({
            "success": false,
            "message": self.message(),
        })
    }

    fn set_message<M: Into<String>>(&mut self, msg: M) {
        let msg = msg.into();
        match self {
            Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::BadRequest(m)
            | Error::NotFound(m)
            | Error::SmsCooldown(m)
            | Error::UserExists(m)
            | Error::Internal(m) => *m = msg,
        }
    }
}

pub trait MapResult<S> {
    fn map_res(self, msg: &str) -> Result<S, Error>;
}

impl<S, E> MapResult<S> for Result<S, E>
where
    Error: From<E>,
{
    fn map_res(self, msg: &str) -> Result<S, Error> {
        self.map_err(|e| {
            let mut err = Error::from(e);
            err.set_message(msg);
            err
        })
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Error::NotFound("Resource not found".into()),
            other => {
                error!("database error: {other:?}");
                Error::Internal("Internal server error".into())
            }
        }
    }
}

impl From<diesel::r2d2::Error> for Error {
    fn from(e: diesel::r2d2::Error) -> Self {
        error!("connection pool error: {e:?}");
        Error::Internal("Internal server error".into())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        debug!("token decode failed: {e:?}");
        Error::Unauthorized("Invalid or expired token".into())
    }
}

impl From<bcrypt::BcryptError> for Error {
    fn from(e: bcrypt::BcryptError) -> Self {
        error!("bcrypt error: {e:?}");
        Error::Internal("Internal server error".into())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let body = serde_json::to_string(&self.body()).unwrap_or_else(|_| "{}".to_string());

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

///
/// Error return macros, one per kind, mirroring the `err!` early-return idiom.
///
#[macro_export]
macro_rules! err_unauthorized {
    ($msg:expr) => {{
        return Err($crate::error::Error::Unauthorized($msg.into()));
    }};
}

#[macro_export]
macro_rules! err_forbidden {
    ($msg:expr) => {{
        return Err($crate::error::Error::Forbidden($msg.into()));
    }};
}

#[macro_export]
macro_rules! err_bad_request {
    ($msg:expr) => {{
        return Err($crate::error::Error::BadRequest($msg.into()));
    }};
}

#[macro_export]
macro_rules! err_not_found {
    ($msg:expr) => {{
        return Err($crate::error::Error::NotFound($msg.into()));
    }};
}

#[macro_export]
macro_rules! err_sms_cooldown {
    ($msg:expr) => {{
        return Err($crate::error::Error::SmsCooldown($msg.into()));
    }};
}

#[macro_export]
macro_rules! err_user_exists {
    ($msg:expr) => {{
        return Err($crate::error::Error::UserExists($msg.into()));
    }};
}

#[macro_export]
macro_rules! err_internal {
    ($msg:expr) => {{
        return Err($crate::error::Error::Internal($msg.into()));
    }};
}
