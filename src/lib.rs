/*!
 * @file lib.rs
 * @brief A programmable mock server for the MongoDB wire protocol
 */

pub mod autoresponder;
pub mod config;
pub mod connection;
pub mod error;
pub mod helper;
pub mod inbox;
pub mod logging;
pub mod pattern;
pub mod reply_spec;
pub mod request;
pub mod server;
pub mod tls;
pub mod wire;

pub use autoresponder::{ReplyAction, ResponderHandle};
pub use config::{AutoIsMaster, ServerOptions, ServerOptionsBuilder};
pub use error::{MockError, Result};
pub use helper::{go, going, wait_until, Going, ScopedGoing};
pub use pattern::{OpClass, Pattern, PatternDoc, PatternValue};
pub use reply_spec::ReplySpec;
pub use request::Request;
pub use server::{MockServer, ServerState};
