use std::collections::HashSet;

use async_trait::async_trait;

use tokio::sync::Mutex;

use crate::error::{Error, Result};

use super::{MailTransport, OutgoingEmail};

/// In-process transport capturing sent mail in an outbox.
///
/// Individual recipient addresses can be scripted to fail, to exercise the
/// engine's per-recipient fault isolation.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    outbox: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to a recipient line containing `address` fail
    pub async fn fail_for(&self, address: &str) {
        self.failing.lock().await.insert(address.to_string());
    }

    /// Captured mail, in send order
    pub async fn outbox(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.outbox.lock().await.len()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let failing = self.failing.lock().await;
        if failing.iter().any(|address| email.to.contains(address)) {
            return Err(Error::Transport(format!(
                "Scripted failure for {}",
                email.to
            )));
        }
        drop(failing);

        self.outbox.lock().await.push(email.clone());
        Ok(())
    }
}
