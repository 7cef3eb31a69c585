//! An ioredis-style Redis client API over a pluggable store driver.
//!
//! [`Redis`] exposes every command as a method returning a future,
//! [`Pipeline`] batches them (optionally as a MULTI/EXEC transaction with
//! WATCH support), and pub/sub deliveries arrive as [`Event`]s.

pub mod client;
pub mod command;
pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod pubsub;
pub mod resp;
pub mod retry;
pub mod translate;

pub use client::{CommandFuture, Redis, Status};
pub use command::{ArgValue, CallArgs, Command, ReplyShape, Value};
pub use commands::Commands;
pub use config::RedisOptions;
pub use driver::{Connection, Driver, NativeDriver, RawMessage, Subscription};
pub use error::{Error, RedisErrorKind, Result};
pub use events::{Event, EventKind, ListenerId};
pub use pipeline::{Outcome, Pipeline};
pub use resp::RespValue;
