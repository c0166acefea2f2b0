use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

use crate::session::SessionId;
use crate::shell::Uid;

/// Registry notifications.
///
/// Delivery to every live subscriber's queue completes before the registry
/// call that caused the event returns; subscribers drain their receiver on
/// the compositor thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The active session's socket changed identity; clients holding the
    /// old path should reconnect.
    SocketFileChanged,
    /// A different session became active. Downstream services refresh
    /// per-user environment state on this.
    SessionChanged,
    /// The session is going away; holders of back-references to its socket
    /// or Xwayland instance must detach now.
    SessionAboutToBeDestroyed { id: SessionId, uid: Uid },
    XwaylandCreated { uid: Uid },
    XwaylandDestroyed { uid: Uid },
}

/// Fan-out point for [`SessionEvent`]s.
///
/// Cheap to clone; all clones share one subscriber list, so the session
/// entities can emit their teardown events without going through the
/// manager.
#[derive(Clone, Default)]
pub struct EventBroker {
    subscribers: Rc<RefCell<Vec<mpsc::Sender<SessionEvent>>>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.borrow_mut().push(tx);
        rx
    }

    /// Queue `event` to every subscriber, dropping the ones that went away.
    pub(crate) fn broadcast(&self, event: SessionEvent) {
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBroker, SessionEvent};

    #[test]
    fn subscribers_receive_broadcasts() {
        let broker = EventBroker::new();
        let rx = broker.subscribe();

        broker.broadcast(SessionEvent::SessionChanged);
        broker.broadcast(SessionEvent::SocketFileChanged);

        assert_eq!(rx.try_recv(), Ok(SessionEvent::SessionChanged));
        assert_eq!(rx.try_recv(), Ok(SessionEvent::SocketFileChanged));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clones_share_the_subscriber_list() {
        let broker = EventBroker::new();
        let clone = broker.clone();
        let rx = broker.subscribe();

        clone.broadcast(SessionEvent::SessionChanged);
        assert_eq!(rx.try_recv(), Ok(SessionEvent::SessionChanged));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let broker = EventBroker::new();
        let dead = broker.subscribe();
        drop(dead);
        let live = broker.subscribe();

        broker.broadcast(SessionEvent::SessionChanged);
        assert_eq!(live.try_recv(), Ok(SessionEvent::SessionChanged));
        assert_eq!(broker.subscribers.borrow().len(), 1);
    }
}
