use chrono::{ DateTime, Utc };

use crate::models::chat::{ Message, Origin };

/// Ordered message history plus the "waiting for a reply" flag.
///
/// The store is owned by the connection manager's task, so it needs no locking.
/// It only keeps the sequence and the flag; policy such as which messages clear
/// `pending` or when to seed a greeting belongs to the caller.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    pending: bool,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// Builds a message stamped no earlier than anything already issued this session.
    pub fn stamp(&mut self, content: impl Into<String>, origin: Origin) -> Message {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        Message::new(content, origin, timestamp)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub fn format_transcript(messages: &[Message]) -> String {
    let mut result = String::new();
    for msg in messages {
        let role_display = match msg.origin() {
            Origin::User => "You",
            Origin::Remote => "Assistant",
        };
        result.push_str(&format!("{}: {}\n", role_display, msg.content()));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_insertion_order() {
        let mut store = ConversationStore::new();
        for (i, origin) in [Origin::User, Origin::Remote, Origin::User].into_iter().enumerate() {
            let msg = store.stamp(format!("m{}", i), origin);
            store.append(msg);
        }
        let contents: Vec<&str> = store.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
        assert_eq!(store.last().map(|m| m.origin()), Some(Origin::User));
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut store = ConversationStore::new();
        let mut previous = None;
        for i in 0..200 {
            let msg = store.stamp(i.to_string(), Origin::Remote);
            if let Some(prev) = previous {
                assert!(msg.timestamp() >= prev);
            }
            previous = Some(msg.timestamp());
            store.append(msg);
        }
    }

    #[test]
    fn clear_and_pending_are_independent() {
        let mut store = ConversationStore::new();
        let msg = store.stamp("hi", Origin::User);
        store.append(msg);
        store.set_pending(true);

        store.clear();
        assert!(store.is_empty());
        assert!(store.pending());

        store.set_pending(false);
        assert!(!store.pending());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn transcript_labels_each_side() {
        let mut store = ConversationStore::new();
        let a = store.stamp("hi", Origin::User);
        let b = store.stamp("hello!", Origin::Remote);
        assert_eq!(format_transcript(&[a, b]), "You: hi\nAssistant: hello!\n");
    }
}
