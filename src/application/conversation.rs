use crate::domain::types::ChatMessage;
use tokio::sync::{Mutex, MutexGuard};

/// In-memory chat history. Append-only; never truncated or persisted.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Mutex<Vec<ChatMessage>>,
    turn: Mutex<()>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_message(&self, message: ChatMessage) {
        self.messages.lock().await.push(message);
    }

    /// Snapshot of the history in append order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Waits for any running turn to finish and holds the turn until the
    /// returned guard is dropped.
    pub(crate) async fn begin_turn(&self) -> ConversationTurn<'_> {
        ConversationTurn {
            _guard: self.turn.lock().await,
        }
    }
}

pub(crate) struct ConversationTurn<'a> {
    _guard: MutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::MessageRole;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn messages_come_back_in_append_order() {
        let conversation = Conversation::new();
        assert!(conversation.is_empty().await);

        conversation.add_message(ChatMessage::user("hello")).await;
        conversation.add_message(ChatMessage::assistant("hi")).await;
        conversation.add_message(ChatMessage::user("hello")).await;

        let messages = conversation.messages().await;
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(messages[2].text(), "hello");
        assert_eq!(conversation.len().await, 3);
    }

    #[tokio::test]
    async fn snapshots_do_not_alias_history() {
        let conversation = Conversation::new();
        conversation.add_message(ChatMessage::user("one")).await;

        let mut snapshot = conversation.messages().await;
        snapshot.clear();

        assert_eq!(conversation.len().await, 1);
    }

    #[tokio::test]
    async fn turns_are_exclusive() {
        let conversation = Arc::new(Conversation::new());
        let first = conversation.begin_turn().await;

        let waiter = {
            let conversation = conversation.clone();
            tokio::spawn(async move {
                let _turn = conversation.begin_turn().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second turn starts")
            .unwrap();
    }
}
