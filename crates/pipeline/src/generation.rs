use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// An epoch-scoped cancellation context shared by every task created during
/// one render cycle.
///
/// Tasks hold an `Arc` to the generation that was current when they were
/// created, never a lookup of "the current one". Aborting a generation is
/// therefore visible to all of its tasks, mid-flight or not, while tasks of
/// a newer cycle are unaffected.
#[derive(Debug)]
pub struct Generation {
    epoch: u64,
    token: CancellationToken,
}

impl Generation {
    pub(crate) fn new(epoch: u64) -> Arc<Self> {
        Arc::new(Self {
            epoch,
            token: CancellationToken::new(),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once this generation has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
