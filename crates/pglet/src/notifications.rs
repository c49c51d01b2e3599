//! Notification subscriptions.
//!
//! Maps channel names to caller callback sets plus one cross-channel
//! set. The hub only tracks membership; the session decides when a
//! channel's first subscription warrants an engine-side `LISTEN` and
//! when an emptied set warrants `UNLISTEN`. Dispatch happens after the
//! triggering call completes, per-channel listeners before global ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pglet_protocol::Notification;

/// Callback invoked for each notification.
pub type NotificationCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Handle for removing one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct NotificationHub {
    next_id: AtomicU64,
    channels: Mutex<HashMap<String, Vec<(u64, NotificationCallback)>>>,
    global: Mutex<Vec<(u64, NotificationCallback)>>,
}

impl NotificationHub {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Add a channel listener. Returns the id and whether this is the
    /// channel's first listener (meaning an engine-side subscribe is
    /// needed).
    pub fn subscribe_channel(
        &self,
        channel: &str,
        callback: NotificationCallback,
    ) -> (ListenerId, bool) {
        let id = self.next_id();
        let mut channels = self.channels.lock();
        let listeners = channels.entry(channel.to_owned()).or_default();
        let first = listeners.is_empty();
        listeners.push((id, callback));
        (ListenerId(id), first)
    }

    /// Remove a channel listener. Returns true when the channel's set
    /// became empty and was removed (engine-side unsubscribe needed).
    pub fn unsubscribe_channel(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.lock();
        let Some(listeners) = channels.get_mut(channel) else {
            return false;
        };
        listeners.retain(|(lid, _)| *lid != id.0);
        if listeners.is_empty() {
            channels.remove(channel);
            true
        } else {
            false
        }
    }

    /// Add a cross-channel listener.
    pub fn subscribe_global(&self, callback: NotificationCallback) -> ListenerId {
        let id = self.next_id();
        self.global.lock().push((id, callback));
        ListenerId(id)
    }

    /// Remove a cross-channel listener.
    pub fn unsubscribe_global(&self, id: ListenerId) {
        self.global.lock().retain(|(lid, _)| *lid != id.0);
    }

    /// Callbacks to run for one notification: the channel's listeners in
    /// subscription order, then the global listeners.
    pub fn listeners_for(&self, channel: &str) -> Vec<NotificationCallback> {
        let mut out = Vec::new();
        if let Some(listeners) = self.channels.lock().get(channel) {
            out.extend(listeners.iter().map(|(_, cb)| Arc::clone(cb)));
        }
        out.extend(self.global.lock().iter().map(|(_, cb)| Arc::clone(cb)));
        out
    }
}
