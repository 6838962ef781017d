//! Spoken alert throttling.
//!
//! Each identity (or the shared `unknown` key) has its own cooldown, so
//! alternating identities never suppress one another.

use crate::types::{Category, RecognizedFace, UNKNOWN_ID};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum gap between two announcements for the same identity.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_millis(5000);

/// Speaks phrases. Implementations must not block the caller.
pub trait Speaker: Send + Sync {
    fn speak(&self, phrase: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub key: String,
    pub phrase: String,
}

#[derive(Debug)]
pub struct AlertDispatcher {
    cooldown: Duration,
    muted: bool,
    distinguished_id: Option<String>,
    last_spoken: HashMap<String, Instant>,
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            muted: false,
            distinguished_id: None,
            last_spoken: HashMap::new(),
        }
    }

    /// Identity that gets its own announcement phrase.
    pub fn with_distinguished(mut self, id: Option<String>) -> Self {
        self.distinguished_id = id;
        self
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Decide which faces of this cycle get announced at `now`.
    pub fn dispatch(&mut self, faces: &[RecognizedFace], now: Instant) -> Vec<Announcement> {
        if self.muted {
            return Vec::new();
        }

        let mut announcements = Vec::new();
        for face in faces {
            let key = if face.is_known() { face.id.as_str() } else { UNKNOWN_ID };

            let recent = self
                .last_spoken
                .get(key)
                .is_some_and(|&t| now.saturating_duration_since(t) < self.cooldown);
            if recent {
                tracing::trace!(key, "alert suppressed by cooldown");
                continue;
            }

            self.last_spoken.insert(key.to_string(), now);
            announcements.push(Announcement {
                key: key.to_string(),
                phrase: self.phrase_for(face),
            });
        }
        announcements
    }

    fn phrase_for(&self, face: &RecognizedFace) -> String {
        if self.distinguished_id.as_deref() == Some(face.id.as_str()) && face.is_known() {
            return format!("Attention: {} is here", face.name);
        }
        match face.category {
            Category::User => format!("Welcome back, {}", face.name),
            Category::Celebrity => format!("{} spotted", face.name),
            Category::Unknown => "Unknown person detected".to_string(),
        }
    }
}
