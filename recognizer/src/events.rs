use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default number of events kept by [`EventLog::new`] when given 0.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// A query that matched an enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionEvent {
    /// Identity key that was recognized.
    pub name: String,
    pub distance: f32,
    pub timestamp: DateTime<Utc>,
}

/// Bounded log of recent recognitions, oldest dropped first.
pub struct EventLog {
    events: Mutex<VecDeque<RecognitionEvent>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity > 0 {
            capacity
        } else {
            DEFAULT_EVENT_CAPACITY
        };
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event stamped with the current time.
    pub fn record(&self, name: &str, distance: f32) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(RecognitionEvent {
            name: name.to_string(),
            distance,
            timestamp: Utc::now(),
        });
    }

    /// Events newest first.
    pub fn recent(&self) -> Vec<RecognitionEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first() {
        let log = EventLog::new(10);
        log.record("alice", 0.1);
        log.record("bob", 0.2);
        let names: Vec<String> = log.recent().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["bob", "alice"]);
    }

    #[test]
    fn drops_oldest_when_full() {
        let log = EventLog::new(3);
        for name in ["a", "b", "c", "d", "e"] {
            log.record(name, 0.0);
        }
        assert_eq!(log.len(), 3);
        let names: Vec<String> = log.recent().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["e", "d", "c"]);
    }

    #[test]
    fn zero_capacity_uses_default() {
        let log = EventLog::new(0);
        assert_eq!(log.capacity(), DEFAULT_EVENT_CAPACITY);
        assert!(log.is_empty());
    }
}
