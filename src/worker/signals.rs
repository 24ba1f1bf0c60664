//! Suspension points.
//!
//! Every wait a worker performs goes through here so that a stop or a fleet
//! pause is noticed no matter where the worker is.

use super::errors::{WorkerError, WorkerResult};
use crate::coordinator::Coordinator;
use crate::coordinator::types::{Directive, WorkerId};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;

pub struct Signals {
    worker: WorkerId,
    mailbox: mpsc::Receiver<Directive>,
    coordinator: Arc<Coordinator>,
    /// `Init` can be drained by an earlier suspension point.
    init_seen: bool,
}

impl Signals {
    pub fn new(
        worker: WorkerId,
        mailbox: mpsc::Receiver<Directive>,
        coordinator: Arc<Coordinator>,
    ) -> Self {
        Self {
            worker,
            mailbox,
            coordinator,
            init_seen: false,
        }
    }

    /// Waits for the `Init` directive that starts the pipeline.
    pub async fn await_init(&mut self) -> WorkerResult<()> {
        if self.init_seen {
            return Ok(());
        }
        let wait = self.coordinator.config().init_wait();

        let received = tokio::time::timeout(wait, async {
            loop {
                match self.mailbox.recv().await {
                    Some(Directive::Init) => return Ok(()),
                    Some(Directive::Halt) | None => return Err(WorkerError::Stopped),
                    Some(other) => {
                        tracing::debug!("{} ignoring {:?} before init", self.worker, other)
                    }
                }
            }
        })
        .await;

        match received {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Fatal(format!(
                "no Init directive within {}s",
                wait.as_secs()
            ))),
        }
    }

    /// Checked before every step.
    ///
    /// Drains the mailbox, then trusts the shared flags: a frozen fleet parks
    /// the worker until the pause is lifted and re-drives it.
    pub async fn boundary(&mut self) -> WorkerResult<()> {
        loop {
            match self.mailbox.try_recv() {
                Ok(Directive::Halt) | Err(TryRecvError::Disconnected) => {
                    return Err(WorkerError::Stopped);
                }
                Ok(directive) => self.note(directive),
                Err(TryRecvError::Empty) => break,
            }
        }

        let flags = self.coordinator.flags().await?;
        if flags.stop_requested {
            return Err(WorkerError::Stopped);
        }
        if flags.frozen {
            self.wait_for_resume().await?;
            return Err(WorkerError::Redrive);
        }
        Ok(())
    }

    /// Sleeps for `duration` unless a directive cuts the sleep short.
    pub async fn pause(&mut self, duration: Duration) -> WorkerResult<()> {
        let deadline = Instant::now() + duration;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                directive = self.mailbox.recv() => match directive {
                    Some(Directive::Halt) | None => return Err(WorkerError::Stopped),
                    Some(Directive::Suspend) => {
                        self.wait_for_resume().await?;
                        return Err(WorkerError::Redrive);
                    }
                    Some(other) => self.note(other),
                },
            }
        }

        self.boundary().await
    }

    /// Parks the worker while the fleet is frozen.
    ///
    /// Returns once the pause flags are cleared, whether or not a `Resume`
    /// directive made it into the mailbox.
    pub async fn wait_for_resume(&mut self) -> WorkerResult<()> {
        let poll = self.coordinator.config().flag_poll();

        loop {
            let flags = self.coordinator.flags().await?;
            if flags.stop_requested {
                return Err(WorkerError::Stopped);
            }
            if !flags.frozen {
                tracing::debug!("{} resuming", self.worker);
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                directive = self.mailbox.recv() => match directive {
                    Some(Directive::Halt) | None => return Err(WorkerError::Stopped),
                    Some(other) => self.note(other),
                },
            }
        }
    }

    fn note(&mut self, directive: Directive) {
        if directive == Directive::Init {
            self.init_seen = true;
        }
        tracing::trace!("{} drained {:?}", self.worker, directive);
    }
}
