use std::sync::Mutex;

use crate::types::Message;

/// Priority-ordered inter-server message queue (spec §4.9). Higher
/// `MessagePriority` drains first; among equal priorities, insertion order
/// is preserved (FIFO), matching the original's insert-before-first-lower
/// scan.
pub struct MessageQueue {
    messages: Mutex<Vec<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self { messages: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, message: Message) {
        let mut queue = self.messages.lock().unwrap();
        let insert_at = queue.iter().position(|existing| message.priority > existing.priority);
        match insert_at {
            Some(i) => queue.insert(i, message),
            None => queue.push(message),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the current queue for a processing pass.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Removes every message whose `message_id` is in `ids` — used once a
    /// processing pass has resolved (delivered, expired, or exhausted)
    /// those messages.
    pub fn remove_ids(&self, ids: &[String]) {
        let mut queue = self.messages.lock().unwrap();
        queue.retain(|m| !ids.contains(&m.message_id));
    }

    /// Replaces a message in place (used to persist an incremented
    /// `delivery_attempts` after a failed delivery attempt).
    pub fn replace(&self, updated: Message) {
        let mut queue = self.messages.lock().unwrap();
        if let Some(slot) = queue.iter_mut().find(|m| m.message_id == updated.message_id) {
            *slot = updated;
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of examining one message during a processing pass (spec §4.9:
/// expired and over-attempt messages are discarded with a log; the rest
/// are either delivered or retried).
pub enum MessageOutcome {
    Expired,
    AttemptsExhausted,
    ReadyToDeliver,
}

/// Pure classification used before attempting delivery, so the "is this
/// message still eligible" decision is testable without a live registry.
pub fn classify_for_delivery(message: &Message, now: f64) -> MessageOutcome {
    if let Some(expires_at) = message.expires_at {
        if now > expires_at {
            return MessageOutcome::Expired;
        }
    }
    if message.delivery_attempts >= message.max_attempts {
        return MessageOutcome::AttemptsExhausted;
    }
    MessageOutcome::ReadyToDeliver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessagePriority;

    fn msg(id: &str, priority: MessagePriority) -> Message {
        Message {
            message_id: id.to_string(),
            from_server: "a".to_string(),
            to_server: "b".to_string(),
            message_type: "ping".to_string(),
            payload: serde_json::json!({}),
            priority,
            created_at: 0.0,
            expires_at: None,
            delivery_attempts: 0,
            max_attempts: 3,
        }
    }

    #[test]
    fn higher_priority_drains_first() {
        let queue = MessageQueue::new();
        queue.push(msg("1", MessagePriority::Normal));
        queue.push(msg("2", MessagePriority::Critical));
        queue.push(msg("3", MessagePriority::Low));

        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].message_id, "2");
        assert_eq!(snapshot[1].message_id, "1");
        assert_eq!(snapshot[2].message_id, "3");
    }

    #[test]
    fn equal_priority_preserves_fifo_order() {
        let queue = MessageQueue::new();
        queue.push(msg("1", MessagePriority::Normal));
        queue.push(msg("2", MessagePriority::Normal));
        let snapshot = queue.snapshot();
        assert_eq!(snapshot[0].message_id, "1");
        assert_eq!(snapshot[1].message_id, "2");
    }

    #[test]
    fn expired_message_is_classified_expired() {
        let mut m = msg("1", MessagePriority::Normal);
        m.expires_at = Some(100.0);
        assert!(matches!(classify_for_delivery(&m, 200.0), MessageOutcome::Expired));
    }

    #[test]
    fn exhausted_attempts_classified_correctly() {
        let mut m = msg("1", MessagePriority::Normal);
        m.delivery_attempts = 3;
        assert!(matches!(classify_for_delivery(&m, 0.0), MessageOutcome::AttemptsExhausted));
    }

    #[test]
    fn fresh_message_ready_to_deliver() {
        let m = msg("1", MessagePriority::Normal);
        assert!(matches!(classify_for_delivery(&m, 0.0), MessageOutcome::ReadyToDeliver));
    }
}
