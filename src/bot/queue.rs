// src/bot/queue.rs - Non-blocking event queue between collaborator tasks and the event loop

use log::debug;
use tokio::sync::mpsc;

use crate::types::{Event, EventKind};

/// Producer half handed to collaborators. Sending never blocks.
#[derive(Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Stamp and enqueue an event. Returns false once the event loop is gone.
    pub fn send(&self, kind: EventKind) -> bool {
        self.send_event(Event::new(kind))
    }

    pub fn send_event(&self, event: Event) -> bool {
        match self.inner.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(target: "core", "Event loop closed, dropping event");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create a connected sender/receiver pair
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (inner, rx) = mpsc::unbounded_channel();
    (EventSender { inner }, rx)
}
