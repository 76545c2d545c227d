//! Publishes mail to a Redis channel for an external mail worker.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::{MailError, MailItem, MailQueue};

pub struct RedisMailQueue {
    conn: ConnectionManager,
    channel: String,
}

impl RedisMailQueue {
    /// Connects to `url` and publishes on `channel`.
    pub async fn connect(url: &str, channel: &str) -> Result<Self, MailError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(channel, "mail queue connected to redis");
        Ok(Self::new(conn, channel))
    }

    pub fn new(conn: ConnectionManager, channel: &str) -> Self {
        Self {
            conn,
            channel: channel.to_string(),
        }
    }
}

/// The message published for `item`: its JSON form.
pub(crate) fn payload(item: &MailItem) -> Result<String, MailError> {
    Ok(serde_json::to_string(item)?)
}

#[async_trait]
impl MailQueue for RedisMailQueue {
    async fn send(&self, item: MailItem) -> Result<(), MailError> {
        let message = payload(&item)?;
        let mut conn = self.conn.clone();
        let receivers: u64 = conn.publish(&self.channel, message).await?;
        debug!(kind = ?item.kind, receivers, "mail published");
        Ok(())
    }
}
