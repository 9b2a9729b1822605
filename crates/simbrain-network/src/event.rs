//! Notifications sent to external collaborators (editors, loggers, couplings).

use crate::ids::{GroupId, ListenerId, NeuronId, SynapseId};
use simbrain_core::Time;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    NeuronAdded(NeuronId),
    NeuronRemoved(NeuronId),
    NeuronChanged(NeuronId),
    NeuronMoved(NeuronId),
    NeuronTypeChanged {
        neuron: NeuronId,
        old_rule: &'static str,
        new_rule: &'static str,
    },
    NeuronLabelChanged(NeuronId),
    SynapseAdded(SynapseId),
    SynapseRemoved(SynapseId),
    SynapseChanged(SynapseId),
    GroupAdded(GroupId),
    GroupRemoved(GroupId),
    GroupChanged(GroupId),
    /// Fired once at the end of every completed tick
    Updated { tick: u64, time: Time },
}

impl NetworkEvent {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            NetworkEvent::NeuronAdded(_)
                | NetworkEvent::NeuronRemoved(_)
                | NetworkEvent::SynapseAdded(_)
                | NetworkEvent::SynapseRemoved(_)
                | NetworkEvent::GroupAdded(_)
                | NetworkEvent::GroupRemoved(_)
        )
    }
}

/// Receives network events. Listeners cannot reach back into the network
/// while an event is being delivered.
pub trait NetworkListener: Send {
    fn network_event(&mut self, event: &NetworkEvent);
}

impl<F> NetworkListener for F
where
    F: FnMut(&NetworkEvent) + Send,
{
    fn network_event(&mut self, event: &NetworkEvent) {
        self(event)
    }
}

/// Registered listeners, notified in registration order
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Vec<(ListenerId, Box<dyn NetworkListener>)>,
}

impl Listeners {
    pub fn add(&mut self, id: ListenerId, listener: Box<dyn NetworkListener>) {
        self.entries.push((id, listener));
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn fire(&mut self, event: NetworkEvent) {
        for (_, listener) in self.entries.iter_mut() {
            listener.network_event(&event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

/// Listener that records every event into a shared buffer.
///
/// Clones share the buffer, so one clone can be registered while another is
/// kept for reading.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<NetworkEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NetworkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take all recorded events, leaving the log empty
    pub fn drain(&self) -> Vec<NetworkEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, predicate: impl Fn(&NetworkEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    pub fn len(&self) -> usize {
        self.count(|_| true)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NetworkListener for EventLog {
    fn network_event(&mut self, event: &NetworkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_shares_buffer() {
        let log = EventLog::new();
        let mut registered = log.clone();
        registered.network_event(&NetworkEvent::NeuronAdded(NeuronId(1)));
        registered.network_event(&NetworkEvent::Updated { tick: 1, time: 1.0 });

        assert_eq!(log.len(), 2);
        assert_eq!(log.count(|e| matches!(e, NetworkEvent::Updated { .. })), 1);
        assert_eq!(log.drain().len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_listeners_fire_in_order_and_unsubscribe() {
        let first = EventLog::new();
        let second = EventLog::new();
        let mut listeners = Listeners::default();
        listeners.add(ListenerId(1), Box::new(first.clone()));
        listeners.add(ListenerId(2), Box::new(second.clone()));

        listeners.fire(NetworkEvent::GroupAdded(GroupId(1)));
        assert!(listeners.remove(ListenerId(1)));
        assert!(!listeners.remove(ListenerId(1)));
        listeners.fire(NetworkEvent::GroupRemoved(GroupId(1)));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_closure_listener() {
        let mut seen = 0;
        {
            let mut listener = |event: &NetworkEvent| {
                if event.is_structural() {
                    seen += 1;
                }
            };
            listener.network_event(&NetworkEvent::SynapseAdded(SynapseId(1)));
            listener.network_event(&NetworkEvent::SynapseChanged(SynapseId(1)));
        }
        assert_eq!(seen, 1);
    }
}
