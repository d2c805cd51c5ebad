//! Publication and message buffers
//!
//! Each buffer hides its own mutex and exposes only push/take, so callers
//! can never hold two buffer locks at once and no lock outlives a call.

use crate::media::LocalStream;
use std::collections::HashSet;
use std::sync::Mutex;

/// Labels currently considered published
#[derive(Default)]
pub(crate) struct PublishedStreams {
    labels: Mutex<HashSet<String>>,
}

impl PublishedStreams {
    /// Insert a label; returns false if it was already present
    pub(crate) fn try_insert(&self, label: &str) -> bool {
        self.labels.lock().unwrap().insert(label.to_string())
    }

    /// Remove a label; returns false if it was not present
    pub(crate) fn remove(&self, label: &str) -> bool {
        self.labels.lock().unwrap().remove(label)
    }

    pub(crate) fn len(&self) -> usize {
        self.labels.lock().unwrap().len()
    }
}

/// Streams awaiting an add/remove round with the engine
#[derive(Default)]
pub(crate) struct PendingStreams {
    publish: Mutex<Vec<LocalStream>>,
    unpublish: Mutex<Vec<LocalStream>>,
}

impl PendingStreams {
    pub(crate) fn push_publish(&self, stream: LocalStream) {
        self.publish.lock().unwrap().push(stream);
    }

    pub(crate) fn push_unpublish(&self, stream: LocalStream) {
        self.unpublish.lock().unwrap().push(stream);
    }

    /// Take and clear the publish queue
    pub(crate) fn take_publish(&self) -> Vec<LocalStream> {
        std::mem::take(&mut *self.publish.lock().unwrap())
    }

    /// Take and clear the unpublish queue
    pub(crate) fn take_unpublish(&self) -> Vec<LocalStream> {
        std::mem::take(&mut *self.unpublish.lock().unwrap())
    }

    pub(crate) fn publish_len(&self) -> usize {
        self.publish.lock().unwrap().len()
    }

    /// True if either queue holds work
    pub(crate) fn has_pending(&self) -> bool {
        !self.publish.lock().unwrap().is_empty() || !self.unpublish.lock().unwrap().is_empty()
    }
}

/// Text messages waiting for an open data channel
#[derive(Default)]
pub(crate) struct PendingMessages {
    messages: Mutex<Vec<String>>,
}

impl PendingMessages {
    pub(crate) fn push(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }

    /// Take and clear the queue, preserving order
    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}
