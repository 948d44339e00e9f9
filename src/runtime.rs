//! Async driver for a `ReminderSession`.
//!
//! One task owns the session. It sleeps until the next deadline, wakes for
//! commands (confirmations from the terminal or a hardware button, status
//! queries) and stops on the shutdown signal. All state changes happen on
//! that task, one at a time.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::AlertSeverity;
use crate::session::{DashboardSummary, ReminderSession};

/// Pending commands before senders wait.
const COMMAND_BUFFER: usize = 32;

#[derive(Debug)]
pub enum SessionCommand {
    /// Confirm by id, id prefix or name.
    Confirm(String),
    /// Confirm the earliest pending medication (physical button).
    ConfirmNext,
    Status(oneshot::Sender<DashboardSummary>),
    Shutdown,
}

/// Cloneable front end to a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Returns false once the session task has stopped.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    pub async fn confirm(&self, selector: impl Into<String>) -> bool {
        self.send(SessionCommand::Confirm(selector.into())).await
    }

    pub async fn confirm_next(&self) -> bool {
        self.send(SessionCommand::ConfirmNext).await
    }

    pub async fn status(&self) -> Option<DashboardSummary> {
        let (reply, rx) = oneshot::channel();
        if !self.send(SessionCommand::Status(reply)).await {
            return None;
        }
        rx.await.ok()
    }

    pub async fn shutdown(&self) -> bool {
        self.send(SessionCommand::Shutdown).await
    }
}

/// Spawn the session loop. The task yields the session back when it stops.
pub fn spawn_session(
    session: ReminderSession,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> (SessionHandle, JoinHandle<ReminderSession>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run_session(session, rx, shutdown));
    (SessionHandle { tx }, task)
}

/// Drive an already started session until a shutdown command, the shutdown
/// signal, or every handle being dropped.
pub async fn run_session(
    mut session: ReminderSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    shutdown: impl Future<Output = ()>,
) -> ReminderSession {
    tokio::pin!(shutdown);

    loop {
        let wait = match session.next_deadline() {
            Some(deadline) => match (deadline - session.now()).to_std() {
                Ok(wait) if !wait.is_zero() => wait,
                // Deadline reached or passed
                _ => {
                    session.tick();
                    continue;
                }
            },
            None => idle_wait(&session),
        };

        tokio::select! {
            biased;

            () = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            command = commands.recv() => match command {
                Some(SessionCommand::Shutdown) | None => break,
                Some(command) => handle_command(&mut session, command),
            },
            () = tokio::time::sleep(wait) => {
                session.tick();
            }
        }
    }

    session.shutdown();
    session
}

fn idle_wait(session: &ReminderSession) -> Duration {
    session
        .scheduler()
        .timings()
        .reschedule_period()
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}

fn handle_command(session: &mut ReminderSession, command: SessionCommand) {
    match command {
        SessionCommand::Confirm(selector) => {
            let result = session
                .resolve(&selector)
                .and_then(|id| session.confirm(id));
            if let Err(e) = result {
                tracing::warn!(selector = %selector, error = %e, "Confirmation rejected");
                session.notify(&e.to_string(), AlertSeverity::Error);
            }
        }
        SessionCommand::ConfirmNext => match session.confirm_next() {
            Ok(Some(_)) => {}
            Ok(None) => session.notify("All medications taken for today", AlertSeverity::Info),
            Err(e) => session.notify(&e.to_string(), AlertSeverity::Error),
        },
        SessionCommand::Status(reply) => {
            if reply.send(session.summary()).is_err() {
                tracing::debug!("Status requester went away");
            }
        }
        SessionCommand::Shutdown => {}
    }
}
