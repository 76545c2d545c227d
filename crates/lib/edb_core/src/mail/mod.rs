// @zen-component: AUTH-MailQueue
//
//! Outbound mail queue.
//!
//! The gateway only enqueues [`MailItem`]s; rendering and delivery belong
//! to whatever consumes the queue.

#[cfg(feature = "redis")]
mod redis_queue;

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use crate::models::mail::{MailItem, MailKind};
#[cfg(feature = "redis")]
pub use redis_queue::RedisMailQueue;

/// Mail queue errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail queue error: {0}")]
    Queue(String),

    #[error("Cannot encode mail: {0}")]
    Encode(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait MailQueue: Send + Sync {
    async fn send(&self, item: MailItem) -> Result<(), MailError>;
}

/// Logs each item instead of delivering it. Tokens are never logged, so
/// nothing that needs a token can be completed through this queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailQueue;

#[async_trait]
impl MailQueue for LogMailQueue {
    async fn send(&self, item: MailItem) -> Result<(), MailError> {
        info!(
            kind = ?item.kind,
            to = %item.to,
            has_token = item.token.is_some(),
            "mail queued"
        );
        Ok(())
    }
}

/// Records items for inspection in tests.
#[derive(Debug, Default)]
pub struct MemoryMailQueue {
    items: Mutex<Vec<MailItem>>,
}

impl MemoryMailQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    /// The most recent item of `kind` sent to `to`.
    pub fn last(&self, kind: MailKind, to: &str) -> Option<MailItem> {
        self.sent()
            .into_iter()
            .rev()
            .find(|item| item.kind == kind && item.to == to)
    }
}

#[async_trait]
impl MailQueue for MemoryMailQueue {
    async fn send(&self, item: MailItem) -> Result<(), MailError> {
        self.items
            .lock()
            .map_err(|e| MailError::Queue(e.to_string()))?
            .push(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_queue_finds_the_latest_item() {
        let queue = MemoryMailQueue::new();
        queue
            .send(MailItem::new(MailKind::Otp, "Bob", "bob@example.com").with_token("1"))
            .await
            .unwrap();
        queue
            .send(MailItem::new(MailKind::Otp, "Bob", "bob@example.com").with_token("2"))
            .await
            .unwrap();
        let last = queue.last(MailKind::Otp, "bob@example.com").unwrap();
        assert_eq!(last.token.as_deref(), Some("2"));
        assert!(queue.last(MailKind::Verify, "bob@example.com").is_none());
    }
}
