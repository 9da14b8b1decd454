use crate::commands::{EngineCommand, EngineStatus};
use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

/// Cloneable control surface for a running [`ExecutionLoop`](crate::ExecutionLoop).
#[derive(Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl BotHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    /// Asks the loop to drain and stop. Returns once the request is queued,
    /// not when the loop has exited.
    ///
    /// # Errors
    /// Returns an error if the loop has already exited.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(EngineCommand::Shutdown).await?;
        Ok(())
    }

    /// Clears the drawdown kill switch and rebases peak equity.
    ///
    /// # Errors
    /// Returns an error if the loop has already exited.
    pub async fn reset_kill_switch(&self) -> Result<()> {
        self.tx.send(EngineCommand::ResetKillSwitch).await?;
        Ok(())
    }

    /// Gets the current status of the loop.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn get_status(&self) -> Result<EngineStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(EngineCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }
}
