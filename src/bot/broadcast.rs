//! Owner broadcasts over a [`ReplyChannel`].

use tracing::{debug, info, warn};

use super::scheduler::ReplyChannel;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Send `text` to every chat in `chat_ids`, one at a time.
///
/// A failed chat (blocked bot, deleted account) is logged and skipped.
pub async fn broadcast(channel: &dyn ReplyChannel, chat_ids: &[i64], text: &str) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for &chat_id in chat_ids {
        match channel.send_text(chat_id, text).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                debug!("Broadcast to {} failed: {}", chat_id, e);
                report.failed += 1;
            }
        }
    }

    if report.failed > 0 {
        warn!("Broadcast reached {} chats, {} failed", report.delivered, report.failed);
    } else {
        info!("Broadcast reached {} chats", report.delivered);
    }
    report
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<i64>>,
        blocked: Vec<i64>,
    }

    #[async_trait]
    impl ReplyChannel for Outbox {
        async fn send_text(&self, chat_id: i64, _text: &str) -> anyhow::Result<()> {
            if self.blocked.contains(&chat_id) {
                anyhow::bail!("bot was blocked by the user");
            }
            self.sent.lock().push(chat_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocked_chats_do_not_stop_the_rest() {
        let outbox = Outbox {
            blocked: vec![2, 4],
            ..Default::default()
        };

        let report = broadcast(&outbox, &[1, 2, 3, 4, 5], "news").await;

        assert_eq!(report, BroadcastReport { delivered: 3, failed: 2 });
        assert_eq!(*outbox.sent.lock(), [1, 3, 5]);
    }

    #[tokio::test]
    async fn test_empty_audience() {
        let outbox = Outbox::default();
        assert_eq!(broadcast(&outbox, &[], "news").await, BroadcastReport::default());
    }
}
