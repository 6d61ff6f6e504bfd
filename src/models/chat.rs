use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

use crate::connection::ConnectionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Remote,
}

/// One turn of the conversation. Built only through `Message::new`, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    content: String,
    origin: Origin,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(content: impl Into<String>, origin: Origin, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            origin,
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }
}

/// What the presentation layer gets to see after every processed event.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub pending: bool,
    pub connected: bool,
    pub state: ConnectionState,
    pub retry_attempts: u32,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            pending: false,
            connected: false,
            state: ConnectionState::Idle,
            retry_attempts: 0,
        }
    }
}
