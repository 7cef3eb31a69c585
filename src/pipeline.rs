//! Pipelines and MULTI/EXEC transactions.
//!
//! Commands are recorded without I/O and sent as one batch on
//! [`Pipeline::exec`]. Each entry of the result corresponds to the command
//! queued at the same index; one command failing never affects another.
//! A transaction whose watched keys changed resolves to `None`.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::Redis;
use crate::command::{Command, Value};
use crate::commands::Commands;
use crate::dispatch::settle;
use crate::driver::{Connection, Driver};
use crate::error::{Error, Result};
use crate::resp::types::RespValue;
use crate::translate::translate_error;

/// Outcome of one queued command.
pub type Outcome = Result<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Building,
    Discarded,
    Executing,
    Done,
}

struct State {
    phase: Phase,
    queue: Vec<Command>,
    rejected: usize,
}

/// A batch of commands bound to one client.
pub struct Pipeline<D: Driver> {
    client: Redis<D>,
    transactional: bool,
    state: Mutex<State>,
}

impl<D: Driver> Pipeline<D> {
    pub(crate) fn new(client: Redis<D>, transactional: bool) -> Self {
        Self {
            client,
            transactional,
            state: Mutex::new(State {
                phase: Phase::Building,
                queue: Vec::new(),
                rejected: 0,
            }),
        }
    }

    /// True for `multi()`.
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Commands refused because they came after `exec` or `discard`.
    pub fn rejected(&self) -> usize {
        self.state.lock().rejected
    }

    /// Queue a command; fails once the pipeline was executed or discarded.
    ///
    /// The chaining [`Commands`] methods go through this and only count a
    /// refusal in [`rejected`](Self::rejected); call it directly to get
    /// the error.
    pub fn try_queue(&self, cmd: Command) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Building {
            state.rejected += 1;
            return Err(Error::Aborted(format!(
                "cannot queue {}: pipeline was already executed or discarded",
                cmd.name
            )));
        }
        state.queue.push(cmd);
        Ok(())
    }

    /// Drop everything queued. The following `exec` resolves to an empty
    /// result without touching the connection.
    pub fn discard(&self) {
        let mut state = self.state.lock();
        if state.phase == Phase::Building {
            state.phase = Phase::Discarded;
            state.queue.clear();
        }
    }

    /// Run the batch.
    ///
    /// `Ok(None)` means a watched key changed and the transaction did not
    /// run. Queue-time transaction errors (EXECABORT) and failures of the
    /// link itself are returned as `Err`.
    pub async fn exec(&self) -> Result<Option<Vec<Outcome>>> {
        let commands = {
            let mut state = self.state.lock();
            match state.phase {
                Phase::Building => {
                    state.phase = Phase::Executing;
                    std::mem::take(&mut state.queue)
                }
                Phase::Discarded => {
                    state.phase = Phase::Done;
                    return Ok(Some(Vec::new()));
                }
                Phase::Executing | Phase::Done => {
                    return Err(Error::Aborted("pipeline was already executed".into()));
                }
            }
        };

        let result = if self.transactional {
            self.exec_transaction(&commands).await
        } else {
            self.exec_batch(&commands).await.map(Some)
        };
        self.state.lock().phase = Phase::Done;
        result
    }

    async fn exec_batch(&self, commands: &[Command]) -> Result<Vec<Outcome>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        self.client.ensure_ready().await?;

        let argvs: Vec<Vec<String>> = commands.iter().map(Command::argv).collect();
        let replies = self
            .client
            .dispatcher()
            .within_deadline("pipeline", self.client.driver().pipeline(&argvs))
            .await?;
        if replies.len() != commands.len() {
            return Err(Error::Protocol(format!(
                "pipeline sent {} commands but got {} replies",
                commands.len(),
                replies.len()
            )));
        }
        debug!(commands = commands.len(), "pipeline executed");

        Ok(replies
            .into_iter()
            .zip(commands)
            .map(|(reply, cmd)| match reply {
                Ok(reply) => settle(cmd.shape, reply),
                Err(e) => Err(translate_error(e)),
            })
            .collect())
    }

    async fn exec_transaction(&self, commands: &[Command]) -> Result<Option<Vec<Outcome>>> {
        self.client.ensure_ready().await?;

        let mut batch = Vec::with_capacity(commands.len() + 2);
        batch.push(vec!["MULTI".to_string()]);
        batch.extend(commands.iter().map(Command::argv));
        batch.push(vec!["EXEC".to_string()]);

        let dispatcher = self.client.dispatcher();
        let replies = match self.client.take_watch().await {
            Some(mut watched) => {
                debug!(keys = watched.keys.len(), "exec on watching connection");
                dispatcher.within_deadline("EXEC", watched.conn.pipeline(&batch)).await?
            }
            None => dispatcher
                .within_deadline("EXEC", self.client.driver().pipeline(&batch))
                .await?
                .into_iter()
                .collect::<Result<Vec<_>>>()?,
        };
        read_exec(commands, replies)
    }
}

/// Interpret the replies to `MULTI, cmd…, EXEC`.
fn read_exec(commands: &[Command], replies: Vec<RespValue>) -> Result<Option<Vec<Outcome>>> {
    if replies.len() != commands.len() + 2 {
        return Err(Error::Protocol(format!(
            "transaction of {} commands got {} replies",
            commands.len(),
            replies.len()
        )));
    }
    let mut replies = replies.into_iter();
    if let Some(multi) = replies.next() {
        if multi.is_error() {
            return Err(translate_error(multi));
        }
    }
    // queue acknowledgements; failures here surface again as EXECABORT
    let queued: Vec<RespValue> = replies.by_ref().take(commands.len()).collect();
    let exec = replies.next().unwrap_or(RespValue::Null);

    match exec {
        RespValue::Null => {
            debug!("watched key changed, transaction discarded");
            Ok(None)
        }
        reply if reply.is_error() => {
            let first = queued.iter().find_map(RespValue::error_message).unwrap_or_default();
            warn!(error = ?reply.error_message(), first, "transaction aborted");
            Err(translate_error(reply))
        }
        reply => {
            let items = reply
                .into_items()
                .ok_or_else(|| Error::Protocol("EXEC reply is not an array".into()))?;
            if items.len() != commands.len() {
                return Err(Error::Protocol(format!(
                    "EXEC returned {} results for {} commands",
                    items.len(),
                    commands.len()
                )));
            }
            Ok(Some(
                items
                    .into_iter()
                    .zip(commands)
                    .map(|(item, cmd)| settle(cmd.shape, item))
                    .collect(),
            ))
        }
    }
}

impl<D: Driver> Commands for Pipeline<D> {
    type Reply<'a> = &'a Pipeline<D> where Self: 'a;

    /// Queue and return `self` for chaining. Commands offered after
    /// `exec`/`discard` are refused: logged and counted in
    /// [`Pipeline::rejected`].
    fn command(&self, cmd: Command) -> Self::Reply<'_> {
        if let Err(e) = self.try_queue(cmd) {
            warn!(error = %e, "command ignored");
        }
        self
    }
}

// ── Tests ──────────────────────────────────────────────────────────
