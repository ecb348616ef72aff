//! Trailing-edge debounce on tokio timers.
//!
//! [`debounce`] spawns a driver task that owns a core
//! [`Debouncer`](record_sift_core::debounce::Debouncer) state machine. Each
//! [`Debounced::call`] resets the deadline; when the deadline passes with
//! no newer call, the wrapped function runs once with the last arguments.
//! Dropping the handle stops the driver and discards any pending call.

use std::future::Future;
use std::time::Duration;

use record_sift_core::debounce::Debouncer;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

enum Command<A> {
    Call(A),
    Cancel,
}

/// Handle to a debounced function.
pub struct Debounced<A> {
    tx: mpsc::UnboundedSender<Command<A>>,
}

impl<A> Debounced<A> {
    /// Schedule `f(args)`, replacing any pending arguments.
    pub fn call(&self, args: A) {
        let _ = self.tx.send(Command::Call(args));
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel);
    }
}

/// Wrap `f` so bursts of calls collapse into one, `delay` after the last.
///
/// Must be called from within a tokio runtime.
pub fn debounce<A, F, Fut>(f: F, delay: Duration) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut machine = Debouncer::new(delay);
        loop {
            let deadline = machine.deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Call(args)) => machine.call(args, Instant::now().into_std()),
                    Some(Command::Cancel) => {
                        machine.cancel();
                    }
                    None => break,
                },
                _ = wait_for(deadline) => {
                    if let Some(args) = machine.poll(Instant::now().into_std()) {
                        f(args).await;
                    }
                }
            }
        }
        tracing::debug!("debounce driver stopped");
    });

    Debounced { tx }
}

async fn wait_for(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
