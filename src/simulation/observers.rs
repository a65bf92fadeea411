//! Model change notification.
//!
//! Any number of subscribers can register a callback; each change is delivered
//! to all of them in subscription order.

use crate::geometry::AxisAlignedRegion;

/// Something observable changed in the scenario or its evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChange {
    /// Transmit delays were rewritten for these emitters.
    EmittersChanged(Vec<String>),
    /// An emitter's amplitude was changed.
    AmplitudeChanged(String),
    /// A region finished evaluating.
    RegionSimulated(AxisAlignedRegion),
}

/// Handle returned by [`ModelObservers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&ModelChange)>;

/// Ordered list of model change subscribers.
#[derive(Default)]
pub struct ModelObservers {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl ModelObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&ModelChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn notify(&mut self, change: &ModelChange) {
        log::trace!("Model change {:?} -> {} subscriber(s)", change, self.subscribers.len());
        for (_, callback) in self.subscribers.iter_mut() {
            callback(change);
        }
    }
}

impl std::fmt::Debug for ModelObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelObservers").field("subscribers", &self.subscribers.len()).finish()
    }
}
