//! Subscription records and the registry that holds them.

use core::fmt;

use heapless::Vec;

use super::traits::{NoopHandler, SubscriptionHandler};
use crate::error::SessionError;
use crate::packet::{QoS, Topic, topic_matches};

/// A stable reference to an allocated subscription.
///
/// Handles pair a slot index with the slot's generation, so a handle kept
/// after `deallocate_subscription` never resolves to whatever record later
/// reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionHandle {
    index: u16,
    generation: u16,
}

/// What a subsystem asks for when it subscribes: a topic, a QoS and the
/// callbacks to run for it.
#[derive(Clone)]
pub struct SubscriptionRecord<'a> {
    pub topic: Topic,
    pub qos: QoS,
    pub handler: &'a dyn SubscriptionHandler,
}

impl<'a> SubscriptionRecord<'a> {
    /// A blank record: empty topic, QoS 0, callbacks that do nothing.
    pub fn template() -> Self {
        Self {
            topic: Topic::new(),
            qos: QoS::AtMostOnce,
            handler: &NoopHandler,
        }
    }

    pub fn new(
        topic: &str,
        qos: QoS,
        handler: &'a dyn SubscriptionHandler,
    ) -> Result<Self, SessionError> {
        let mut record = Self::template();
        record.set_topic(topic)?;
        record.qos = qos;
        record.handler = handler;
        Ok(record)
    }

    pub fn set_topic(&mut self, topic: &str) -> Result<(), SessionError> {
        let mut owned = Topic::new();
        owned
            .push_str(topic)
            .map_err(|_| SessionError::TopicTooLong)?;
        self.topic = owned;
        Ok(())
    }
}

impl fmt::Debug for SubscriptionRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("topic", &self.topic.as_str())
            .field("qos", &self.qos)
            .finish_non_exhaustive()
    }
}

/// A live registry entry.
#[derive(Debug)]
pub struct Entry<'a> {
    pub record: SubscriptionRecord<'a>,
    /// Set once the transport accepted a subscribe for this record.
    pub subscribed: bool,
}

struct Slot<'a> {
    generation: u16,
    entry: Option<Entry<'a>>,
}

/// Insertion-ordered arena of subscription records.
///
/// Slots are reused after deallocation, but iteration always follows the
/// order in which the live records were allocated.
pub struct SubscriptionRegistry<'a, const MAX_SUBSCRIPTIONS: usize> {
    slots: Vec<Slot<'a>, MAX_SUBSCRIPTIONS>,
    order: Vec<u16, MAX_SUBSCRIPTIONS>,
}

impl<'a, const MAX_SUBSCRIPTIONS: usize> SubscriptionRegistry<'a, MAX_SUBSCRIPTIONS> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Store a record and return its handle.
    ///
    /// Fails with `AllocationFailed` when every slot is taken.
    pub fn allocate(
        &mut self,
        record: SubscriptionRecord<'a>,
    ) -> Result<SubscriptionHandle, SessionError> {
        let entry = Entry {
            record,
            subscribed: false,
        };

        let index = match self.slots.iter().position(|slot| slot.entry.is_none()) {
            Some(index) => {
                self.slots[index].entry = Some(entry);
                index
            }
            None => {
                self.slots
                    .push(Slot {
                        generation: 0,
                        entry: Some(entry),
                    })
                    .map_err(|_| SessionError::AllocationFailed)?;
                self.slots.len() - 1
            }
        };

        let index = u16::try_from(index).map_err(|_| SessionError::AllocationFailed)?;
        if self.order.push(index).is_err() {
            self.slots[usize::from(index)].entry = None;
            return Err(SessionError::AllocationFailed);
        }

        Ok(SubscriptionHandle {
            index,
            generation: self.slots[usize::from(index)].generation,
        })
    }

    /// Remove a record, returning it so the caller can clean up after it.
    pub fn deallocate(&mut self, handle: SubscriptionHandle) -> Result<Entry<'a>, SessionError> {
        let slot = self
            .slots
            .get_mut(usize::from(handle.index))
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(SessionError::UnknownSubscription)?;
        let entry = slot.entry.take().ok_or(SessionError::UnknownSubscription)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.order.retain(|&index| index != handle.index);
        Ok(entry)
    }

    pub fn get(&self, handle: SubscriptionHandle) -> Option<&Entry<'a>> {
        self.slots
            .get(usize::from(handle.index))
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, handle: SubscriptionHandle) -> Option<&mut Entry<'a>> {
        self.slots
            .get_mut(usize::from(handle.index))
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Handles of all live records, in allocation order.
    pub fn handles(&self) -> impl Iterator<Item = SubscriptionHandle> + '_ {
        self.order.iter().map(|&index| SubscriptionHandle {
            index,
            generation: self.slots[usize::from(index)].generation,
        })
    }

    /// All live records, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<'a>> + '_ {
        self.order
            .iter()
            .filter_map(|&index| self.slots[usize::from(index)].entry.as_ref())
    }

    /// Records whose topic matches `topic` under the bounded compare.
    pub fn matching<'r>(&'r self, topic: &'r str) -> impl Iterator<Item = &'r Entry<'a>> + 'r {
        self.iter()
            .filter(move |entry| topic_matches(entry.record.topic.as_str(), topic))
    }

    /// Number of allocated records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of records currently marked subscribed.
    pub fn subscribed_count(&self) -> usize {
        self.iter().filter(|entry| entry.subscribed).count()
    }
}

impl<const MAX_SUBSCRIPTIONS: usize> Default for SubscriptionRegistry<'_, MAX_SUBSCRIPTIONS> {
    fn default() -> Self {
        Self::new()
    }
}
