use std::time::Duration;

use tokio::sync::watch;

use crate::error::{RepairError, RepairResult};

/// Operator shutdown combined with the run-wide abort raised when any
/// endpoint exhausts its failure budget.
#[derive(Debug, Clone)]
pub(crate) struct StopSignal {
    shutdown: watch::Receiver<bool>,
    abort: watch::Receiver<bool>,
}

impl StopSignal {
    pub(crate) fn new(shutdown: watch::Receiver<bool>, abort: watch::Receiver<bool>) -> Self {
        Self { shutdown, abort }
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.shutdown.borrow() || *self.abort.borrow()
    }

    pub(crate) fn check(&self) -> RepairResult<()> {
        if self.is_set() {
            Err(RepairError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless stopped first.
    pub(crate) async fn pause(&mut self, duration: Duration) -> RepairResult<()> {
        self.check()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = raised(&mut self.shutdown) => Err(RepairError::Cancelled),
            _ = raised(&mut self.abort) => Err(RepairError::Cancelled),
        }
    }
}

/// Resolves once the flag is true. A dropped sender never resolves.
async fn raised(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|set| *set).await.is_err() {
        std::future::pending::<()>().await;
    }
}
