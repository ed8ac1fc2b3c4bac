use fxhash::FxHashMap;
use std::any::{type_name, Any, TypeId};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use super::constants::{
    BEAM_BUNCH_SIZE, DATA_RETENTION, SYSTEM_TRIGGER_BITS, SYSTEM_TRIGGER_TIME,
    TRIGGER_SAFETY_MARGIN,
};
use super::error::DataManagerError;
use super::hits::{ReadoutData, ReadoutTimestamp, TriggeredCollection};
use super::latency::{resolve_latencies, StreamNode};

/// Anything that can be carried by a managed stream.
///
/// Types which can be written out with a readout event override `to_readout`.
pub trait StreamElement: Clone + Send + 'static {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        let _ = items;
        None
    }
}

/// Timing description of the component filling a stream
#[derive(Debug, Clone, PartialEq)]
pub struct Producer {
    pub name: String,
    /// Delay (ns) between the simulation clock and the newest complete data the
    /// producer can emit, not counting its inputs
    pub local_latency: f64,
    /// How far (ns) past a trigger the producer needs the clock to be before it
    /// can supply its on-trigger data
    pub local_output_time: f64,
}

impl Producer {
    pub fn new(name: &str, local_latency: f64) -> Self {
        Self {
            name: name.to_string(),
            local_latency,
            local_output_time: 0.0,
        }
    }

    pub fn with_local_output_time(mut self, local_output_time: f64) -> Self {
        self.local_output_time = local_output_time;
        self
    }
}

/// Span of a persisted stream written with each trigger, relative to the trigger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadoutWindow {
    pub before: f64,
    pub after: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub time: f64,
}

impl Eq for Trigger {}

impl PartialOrd for Trigger {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Trigger {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.total_cmp(&other.time)
    }
}

impl Trigger {
    /// Event numbers count beam bunches
    pub fn event_number(&self) -> u64 {
        (self.time / BEAM_BUNCH_SIZE).floor() as u64
    }
}

struct TimedBatch {
    time: f64,
    items: Box<dyn Any + Send>,
}

type CollectFn = fn(&VecDeque<TimedBatch>, f64, f64) -> Option<ReadoutData>;

fn collect_readout<T: StreamElement>(
    batches: &VecDeque<TimedBatch>,
    start: f64,
    end: f64,
) -> Option<ReadoutData> {
    let items: Vec<T> = batches
        .iter()
        .filter(|b| b.time >= start && b.time < end)
        .filter_map(|b| b.items.downcast_ref::<Vec<T>>())
        .flat_map(|v| v.iter().cloned())
        .collect();
    T::to_readout(items)
}

struct ManagedStream {
    type_id: TypeId,
    type_name: &'static str,
    producer: Producer,
    dependencies: Vec<String>,
    total_latency: Option<f64>,
    persistent: Option<ReadoutWindow>,
    collect: CollectFn,
    batches: VecDeque<TimedBatch>,
}

/// ReadoutDataManager is the registry of every time-stamped data stream of the
/// simulation. It owns the simulation clock and the trigger queue.
///
/// Each stream is registered once with its element type, the producer filling
/// it and the names of the streams it was computed from. From those the
/// manager derives the total latency of the stream, the delay after which data
/// at a given time is complete.
pub struct ReadoutDataManager {
    current_time: f64,
    streams: FxHashMap<String, ManagedStream>,
    producers: Vec<Producer>,
    triggers: BinaryHeap<Reverse<Trigger>>,
    readout_window: f64,
    trigger_offset: f64,
    trigger_delay: f64,
    retention: f64,
}

impl ReadoutDataManager {
    /// `readout_window` and `trigger_offset` (ns) set the default span of
    /// persisted streams: `[trigger - offset, trigger - offset + window)`
    pub fn new(readout_window: f64, trigger_offset: f64) -> Self {
        Self {
            current_time: 0.0,
            streams: FxHashMap::default(),
            producers: Vec::new(),
            triggers: BinaryHeap::new(),
            readout_window,
            trigger_offset,
            trigger_delay: 0.0,
            retention: DATA_RETENTION,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn trigger_delay(&self) -> f64 {
        self.trigger_delay
    }

    pub fn retention(&self) -> f64 {
        self.retention
    }

    /// Record a producer so its output time is respected by the trigger delay,
    /// even if it owns no stream.
    pub fn register_producer(&mut self, producer: &Producer) {
        if !self.producers.iter().any(|p| p.name == producer.name) {
            self.producers.push(producer.clone());
        }
    }

    pub fn register<T: StreamElement>(
        &mut self,
        name: &str,
        producer: &Producer,
        dependencies: &[&str],
    ) -> Result<(), DataManagerError> {
        self.insert_stream::<T>(name, producer, dependencies, None)
    }

    /// Register a stream which is written out with every trigger
    pub fn register_persistent<T: StreamElement>(
        &mut self,
        name: &str,
        producer: &Producer,
        dependencies: &[&str],
        window: Option<ReadoutWindow>,
    ) -> Result<(), DataManagerError> {
        if T::to_readout(Vec::new()).is_none() {
            return Err(DataManagerError::NotPersistable {
                name: name.to_string(),
                type_name: type_name::<T>(),
            });
        }
        let window = window.unwrap_or(ReadoutWindow {
            before: self.trigger_offset,
            after: self.readout_window - self.trigger_offset,
        });
        self.insert_stream::<T>(name, producer, dependencies, Some(window))
    }

    fn insert_stream<T: StreamElement>(
        &mut self,
        name: &str,
        producer: &Producer,
        dependencies: &[&str],
        persistent: Option<ReadoutWindow>,
    ) -> Result<(), DataManagerError> {
        if name.is_empty() {
            return Err(DataManagerError::MissingName);
        }
        if let Some(existing) = self.streams.get(name) {
            return Err(DataManagerError::DuplicateStream {
                name: name.to_string(),
                type_name: existing.type_name,
            });
        }

        let stream = ManagedStream {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            producer: producer.clone(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            total_latency: None,
            persistent,
            collect: collect_readout::<T>,
            batches: VecDeque::new(),
        };

        let mut graph = self.latency_graph();
        graph.insert(
            name.to_string(),
            StreamNode {
                local_latency: stream.producer.local_latency,
                dependencies: stream.dependencies.clone(),
            },
        );
        let totals = resolve_latencies(&graph)?;

        self.register_producer(producer);
        self.streams.insert(name.to_string(), stream);
        for (stream_name, stream) in self.streams.iter_mut() {
            stream.total_latency = totals.get(stream_name).copied();
        }
        log::debug!(
            "Registered stream \"{}\" of {} from {}",
            name,
            type_name::<T>(),
            producer.name
        );
        Ok(())
    }

    fn latency_graph(&self) -> BTreeMap<String, StreamNode> {
        self.streams
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    StreamNode {
                        local_latency: s.producer.local_latency,
                        dependencies: s.dependencies.clone(),
                    },
                )
            })
            .collect()
    }

    fn stream<T: StreamElement>(&self, name: &str) -> Result<&ManagedStream, DataManagerError> {
        let stream = self
            .streams
            .get(name)
            .ok_or_else(|| DataManagerError::UnknownStream(name.to_string()))?;
        if stream.type_id != TypeId::of::<T>() {
            return Err(DataManagerError::TypeMismatch {
                name: name.to_string(),
                expected: stream.type_name,
                found: type_name::<T>(),
            });
        }
        Ok(stream)
    }

    pub fn total_latency(&self, name: &str) -> Result<f64, DataManagerError> {
        self.streams
            .get(name)
            .ok_or_else(|| DataManagerError::UnknownStream(name.to_string()))?
            .total_latency
            .ok_or_else(|| DataManagerError::UnresolvedLatency(name.to_string()))
    }

    /// Append a batch to a stream. Without an explicit time the batch is placed
    /// at the newest complete time of the stream, `now - total_latency`.
    pub fn append<T: StreamElement>(
        &mut self,
        name: &str,
        time: Option<f64>,
        items: Vec<T>,
    ) -> Result<(), DataManagerError> {
        self.stream::<T>(name)?;
        let time = match time {
            Some(t) => t,
            None => self.current_time - self.total_latency(name)?,
        };
        if items.is_empty() {
            return Ok(());
        }
        if let Some(stream) = self.streams.get_mut(name) {
            stream.batches.push_back(TimedBatch {
                time,
                items: Box::new(items),
            });
        }
        Ok(())
    }

    /// Every element whose batch time lies in `[start, end)`
    pub fn query<T: StreamElement>(
        &self,
        name: &str,
        start: f64,
        end: f64,
    ) -> Result<Vec<T>, DataManagerError> {
        let stream = self.stream::<T>(name)?;
        Ok(stream
            .batches
            .iter()
            .filter(|b| b.time >= start && b.time < end)
            .filter_map(|b| b.items.downcast_ref::<Vec<T>>())
            .flat_map(|v| v.iter().cloned())
            .collect())
    }

    pub fn is_ready(&self, name: &str, time: f64) -> Result<bool, DataManagerError> {
        Ok(time <= self.current_time - self.total_latency(name)?)
    }

    /// Fix the trigger delay and retention once every stream is registered
    pub fn start_of_data(&mut self) -> Result<f64, DataManagerError> {
        let mut longest_after: f64 = 0.0;
        let mut longest_before: f64 = 0.0;
        for (name, stream) in self.streams.iter() {
            let total = stream
                .total_latency
                .ok_or_else(|| DataManagerError::UnresolvedLatency(name.clone()))?;
            let (before, after) = match stream.persistent {
                Some(w) => (w.before, w.after),
                None => (0.0, 0.0),
            };
            longest_after = longest_after.max(total + after);
            longest_before = longest_before.max(before);
        }
        let longest_output = self
            .producers
            .iter()
            .map(|p| p.local_output_time)
            .fold(0.0, f64::max);

        self.trigger_delay = longest_after.max(longest_output) + TRIGGER_SAFETY_MARGIN;
        self.retention = DATA_RETENTION
            .max(self.trigger_delay + longest_before + self.readout_window);
        log::info!(
            "Readout data manager started with trigger delay {} ns and retention {} ns",
            self.trigger_delay,
            self.retention
        );
        Ok(self.trigger_delay)
    }

    pub fn send_trigger(&mut self, time: f64) -> Result<(), DataManagerError> {
        if !time.is_finite() {
            return Err(DataManagerError::BadTriggerTime(time));
        }
        self.triggers.push(Reverse(Trigger { time }));
        Ok(())
    }

    pub fn pending_triggers(&self) -> usize {
        self.triggers.len()
    }

    /// Release the earliest trigger once all data it needs is complete
    pub fn pop_ready_trigger(&mut self) -> Option<Trigger> {
        match self.triggers.peek() {
            Some(Reverse(t)) if t.time <= self.current_time - self.trigger_delay => {
                self.triggers.pop().map(|Reverse(t)| t)
            }
            _ => None,
        }
    }

    /// Data of every persisted stream inside its window around the trigger
    pub fn persistent_readout(&self, trigger: &Trigger) -> Vec<TriggeredCollection> {
        let mut names: Vec<&String> = self
            .streams
            .iter()
            .filter(|(_, s)| s.persistent.is_some())
            .map(|(name, _)| name)
            .collect();
        names.sort();

        let mut collections = Vec::new();
        for name in names {
            let stream = &self.streams[name];
            let Some(window) = stream.persistent else {
                continue;
            };
            let start = trigger.time - window.before;
            let end = trigger.time + window.after;
            if let Some(data) = (stream.collect)(&stream.batches, start, end) {
                collections.push(TriggeredCollection {
                    name: name.clone(),
                    data,
                });
            }
        }
        collections
    }

    /// Trigger-level timestamps attached to every readout event
    pub fn trigger_timestamps(&self, trigger: &Trigger) -> ReadoutData {
        ReadoutData::Timestamps(vec![
            ReadoutTimestamp {
                system: SYSTEM_TRIGGER_BITS,
                time: trigger.time,
            },
            ReadoutTimestamp {
                system: SYSTEM_TRIGGER_TIME,
                time: trigger.time,
            },
        ])
    }

    /// Drop expired data and move the clock forward by one beam bunch
    pub fn advance(&mut self) {
        let horizon = self.current_time - self.retention;
        for stream in self.streams.values_mut() {
            stream.batches.retain(|b| b.time >= horizon);
        }
        self.current_time += BEAM_BUNCH_SIZE;
    }

    #[cfg(test)]
    fn batch_count(&self, name: &str) -> usize {
        self.streams.get(name).map_or(0, |s| s.batches.len())
    }
}
