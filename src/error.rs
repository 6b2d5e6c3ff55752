/*!
 * @file error.rs
 * @brief Error types for the mock server
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MockError {
    #[error("request did not match expected pattern: {0}")]
    AssertionMismatch(String),

    #[error("no request arrived within {0:?}")]
    ReceiveTimeout(std::time::Duration),

    #[error("malformed wire message: {0}")]
    Decode(String),

    #[error("cannot reply: connection is closed")]
    ReplyToDeadConnection,

    #[error("request {0} has already been replied to")]
    DoubleReply(i32),

    #[error("server has stopped")]
    ServerStopped,

    #[error("failed to bind listener: {0}")]
    BindFailure(String),

    #[error("BSON decode error: {0}")]
    Bson(#[from] bson::de::Error),

    #[error("BSON encode error: {0}")]
    BsonSerialization(#[from] bson::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, MockError>;
