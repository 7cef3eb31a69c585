//! Command dispatcher: one driver call per command, reply translated on
//! the way back, every failure surfaced as an [`Error`].

use std::future::Future;
use std::time::Duration;

use crate::command::{Command, ReplyShape, Value};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::resp::types::RespValue;
use crate::translate::translate_error;

/// Stateless apart from its deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    command_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(command_timeout: Option<Duration>) -> Self {
        Self { command_timeout }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    pub async fn dispatch<D: Driver>(&self, driver: &D, cmd: Command) -> Result<Value> {
        let argv = cmd.argv();
        let reply = self
            .within_deadline(&cmd.name, driver.execute(&argv))
            .await
            .map_err(translate_error)?;
        settle(cmd.shape, reply)
    }

    /// Reject with [`Error::Timeout`] once the command deadline passes.
    /// The abandoned I/O is dropped with the future.
    pub async fn within_deadline<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.command_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!("{what} timed out after {limit:?}"))),
            },
            None => fut.await,
        }
    }
}

/// Error frames become errors; anything else goes through the shape's
/// translator.
pub fn settle(shape: ReplyShape, reply: RespValue) -> Result<Value> {
    if reply.is_error() {
        return Err(translate_error(reply));
    }
    Ok(shape.apply(reply))
}

// ── Tests ──────────────────────────────────────────────────────────
