use std::sync::{Arc, Mutex};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

use crate::device::types::DeviceEvent;

/// Fans events out to every subscriber. Publishing never blocks the supervisor task; subscribers
/// that dropped their receiver are forgotten.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<DeviceEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<DeviceEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().expect("Failed to lock EventBus subscribers").push(sender);
        receiver
    }

    pub fn publish(&self, event: DeviceEvent) {
        let mut subscribers = self.subscribers.lock().expect("Failed to lock EventBus subscribers");
        subscribers.retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }
}
