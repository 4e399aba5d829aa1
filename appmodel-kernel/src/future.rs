//! Result handle returned by command execution.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use appmodel_api::Value;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::CommandError;

/// Outcome of a command invocation.
pub type CommandResult = Result<Value, CommandError>;

enum State {
    /// Completed on the calling thread. `None` once the result was taken.
    Ready(Option<CommandResult>),
    /// Dispatched to a worker.
    Pending(oneshot::Receiver<CommandResult>),
}

/// The pending or completed result of one command execution.
///
/// Await it from async code, or call [`CommandFuture::wait`] from a plain
/// thread. Dropping it does not cancel the callback.
pub struct CommandFuture {
    command: String,
    state: State,
}

impl CommandFuture {
    pub(crate) fn ready(command: impl Into<String>, result: CommandResult) -> Self {
        Self { command: command.into(), state: State::Ready(Some(result)) }
    }

    /// Run `job` off the calling thread.
    ///
    /// Uses the blocking pool of the current tokio runtime when there is one,
    /// otherwise a dedicated thread.
    pub(crate) fn spawn<F>(command: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() -> CommandResult + Send + 'static,
    {
        let command = command.into();
        let (tx, rx) = oneshot::channel();
        let work = move || {
            let _ = tx.send(job());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(work);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name(format!("command:{}", command))
                    .spawn(work);
                // On failure the sender is dropped and the future resolves to Canceled.
                if let Err(e) = spawned {
                    tracing::warn!(command = %command, "failed to spawn command thread: {}", e);
                }
            }
        }

        Self { command, state: State::Pending(rx) }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the result is available without blocking.
    pub fn is_done(&mut self) -> bool {
        self.try_result().is_some()
    }

    /// The result if it is available, without blocking.
    pub fn try_result(&mut self) -> Option<&CommandResult> {
        if let State::Pending(rx) = &mut self.state {
            let result = match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => Err(CommandError::Canceled(self.command.clone())),
            };
            self.state = State::Ready(Some(result));
        }
        match &self.state {
            State::Ready(result) => result.as_ref(),
            State::Pending(_) => None,
        }
    }

    /// Block the current thread until the result is available.
    ///
    /// Must not be called from inside an async task; `.await` the future there.
    pub fn wait(self) -> CommandResult {
        match self.state {
            State::Ready(result) => {
                result.unwrap_or_else(|| Err(CommandError::Canceled(self.command)))
            }
            State::Pending(rx) => rx
                .blocking_recv()
                .unwrap_or_else(|_| Err(CommandError::Canceled(self.command))),
        }
    }
}

impl Future for CommandFuture {
    type Output = CommandResult;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(CommandError::Canceled(this.command.clone()))),
            ),
            State::Pending(rx) => Pin::new(rx).poll(cx).map(|received| {
                received.unwrap_or_else(|_| Err(CommandError::Canceled(this.command.clone())))
            }),
        }
    }
}

impl std::fmt::Debug for CommandFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Ready(Some(Ok(_))) => "ok",
            State::Ready(Some(Err(_))) => "failed",
            State::Ready(None) => "taken",
            State::Pending(_) => "pending",
        };
        f.debug_struct("CommandFuture")
            .field("command", &self.command)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_future_is_done() {
        let mut fut = CommandFuture::ready("a", Ok(Value::Int(1)));
        assert!(fut.is_done());
        assert_eq!(fut.wait().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_spawned_without_runtime_uses_thread() {
        let fut = CommandFuture::spawn("b", || Ok(Value::from("done")));
        assert_eq!(fut.wait().unwrap(), Value::from("done"));
    }

    #[tokio::test]
    async fn test_spawned_on_runtime_can_be_awaited() {
        let fut = CommandFuture::spawn("c", || Ok(Value::Bool(true)));
        assert_eq!(fut.await.unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_dropped_sender_is_canceled() {
        let (tx, rx) = oneshot::channel::<CommandResult>();
        drop(tx);
        let fut = CommandFuture { command: "d".into(), state: State::Pending(rx) };
        assert!(matches!(fut.wait(), Err(CommandError::Canceled(_))));
    }
}
