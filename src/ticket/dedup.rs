//! Bounded window of recently handled external ids.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Default number of ids remembered per adapter.
pub const DEFAULT_SEEN_CAPACITY: usize = 4096;

/// Remembers the last `capacity` external ids. Oldest ids are evicted first.
///
/// Not persisted: after a restart the channel's own state (IMAP `\Seen`,
/// Slack retry headers) is authoritative.
pub struct SeenIds {
    capacity: usize,
    inner: Mutex<Window>,
}

#[derive(Default)]
struct Window {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Window::default()),
        }
    }

    /// Record `id`. Returns `false` if it was already in the window.
    pub fn insert(&self, id: &str) -> bool {
        let mut window = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if window.ids.contains(id) {
            return false;
        }
        if window.order.len() >= self.capacity
            && let Some(oldest) = window.order.pop_front()
        {
            window.ids.remove(&oldest);
        }
        window.order.push_back(id.to_string());
        window.ids.insert(id.to_string());
        true
    }

    /// Forget `id` so a later retry is processed again.
    pub fn remove(&self, id: &str) {
        let mut window = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if window.ids.remove(id) {
            window.order.retain(|existing| existing != id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        let window = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        window.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        let window = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        window.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SeenIds {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAPACITY)
    }
}
