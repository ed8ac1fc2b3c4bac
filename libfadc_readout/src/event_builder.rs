use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::data_manager::Trigger;
use super::error::EventBuilderError;
use super::hits::{ReadoutData, TriggeredCollection};

/// Everything written out for one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutEvent {
    pub event_number: u64,
    pub trigger_time: f64,
    pub collections: BTreeMap<String, ReadoutData>,
}

impl ReadoutEvent {
    pub fn new(trigger: &Trigger) -> Self {
        Self {
            event_number: trigger.event_number(),
            trigger_time: trigger.time,
            collections: BTreeMap::new(),
        }
    }
}

/// EventBuilder takes the collections supplied for each released trigger and
/// composes them into ReadoutEvents.
///
/// Collections with the same name are merged, which requires that they hold the
/// same kind of data.
#[derive(Debug, Default)]
pub struct EventBuilder {
    current_event: Option<ReadoutEvent>,
    last_trigger_time: Option<f64>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the event for a trigger.
    ///
    /// Returns `Result<Option<ReadoutEvent>>`. If the Option is Some, it holds the
    /// event of the previous trigger which is now complete.
    pub fn start_event(
        &mut self,
        trigger: &Trigger,
    ) -> Result<Option<ReadoutEvent>, EventBuilderError> {
        if let Some(last) = self.last_trigger_time {
            if trigger.time < last {
                // Triggers are released in time order, anything else is a bug upstream
                return Err(EventBuilderError::TriggerOutOfOrder(trigger.time, last));
            }
        }
        self.last_trigger_time = Some(trigger.time);
        Ok(self.current_event.replace(ReadoutEvent::new(trigger)))
    }

    pub fn append_collection(
        &mut self,
        collection: TriggeredCollection,
    ) -> Result<(), EventBuilderError> {
        let event = self
            .current_event
            .as_mut()
            .ok_or(EventBuilderError::NoActiveEvent)?;
        match event.collections.get_mut(&collection.name) {
            Some(existing) => {
                if !existing.same_kind(&collection.data) || existing.merge(collection.data).is_err() {
                    return Err(EventBuilderError::ConflictingCollection(collection.name));
                }
            }
            None => {
                event.collections.insert(collection.name, collection.data);
            }
        }
        Ok(())
    }

    /// Takes the event being built, if any.
    ///
    /// Used at the end of processing a run.
    pub fn flush_final_event(&mut self) -> Option<ReadoutEvent> {
        self.current_event.take()
    }
}
