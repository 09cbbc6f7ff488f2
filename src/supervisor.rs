// src/supervisor.rs
//! Process lifecycle: runs the scheduler and the listener side by side until
//! cancellation, then waits for both to wind down.

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::listener::{CommandSource, InteractiveListener};
use crate::scheduler::Scheduler;

#[derive(Default)]
pub struct Supervisor {
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that stops both activities when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn both activities and wait for them. They share nothing but the
    /// aggregator they were built with; one of them ending (or panicking)
    /// does not stop the other.
    pub async fn run<S>(self, scheduler: Scheduler, listener: InteractiveListener<S>) -> Result<()>
    where
        S: CommandSource + 'static,
    {
        info!("supervisor starting scheduler and listener");
        let sched = tokio::spawn(scheduler.run(self.shutdown.clone()));
        let listen = tokio::spawn(listener.run(self.shutdown.clone()));

        let (sched_res, listen_res) = tokio::join!(sched, listen);

        let mut failed = Vec::new();
        if let Err(e) = sched_res {
            error!(error = %e, "scheduler task ended abnormally");
            failed.push("scheduler");
        }
        if let Err(e) = listen_res {
            error!(error = %e, "listener task ended abnormally");
            failed.push("listener");
        }
        if !failed.is_empty() {
            bail!("activities ended abnormally: {}", failed.join(", "));
        }
        info!("supervisor stopped");
        Ok(())
    }

    /// Like [`run`](Self::run), cancelling on Ctrl-C or SIGTERM.
    pub async fn run_until_signal<S>(
        self,
        scheduler: Scheduler,
        listener: InteractiveListener<S>,
    ) -> Result<()>
    where
        S: CommandSource + 'static,
    {
        let token = self.shutdown_token();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            token.cancel();
        });
        self.run(scheduler, listener).await
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
