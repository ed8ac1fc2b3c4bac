use serde::{Deserialize, Serialize};
use std::mem::discriminant;

use super::data_manager::StreamElement;
use super::truth::{McParticle, SharedDeposit, TruthDeposit};

/// An integrated pulse with a time in 1/64 sample units. The continuous digitizer
/// stores the pedestal-subtracted integral; the integrated trigger readout stores
/// the raw sum of the samples, pedestal included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigitizedHit {
    pub channel_id: u64,
    pub amplitude: i32,
    pub time: i64,
}

impl DigitizedHit {
    pub fn new(channel_id: u64, amplitude: i32, time: i64) -> Self {
        Self {
            channel_id,
            amplitude,
            time,
        }
    }
}

/// Raw ADC samples from a readout window. `time` is the crossing index within the
/// window for pulse readout and zero for full-window readout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowHit {
    pub channel_id: u64,
    pub time: i32,
    pub samples: Vec<i16>,
}

/// Key identifying an output hit inside a readout event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HitKey {
    pub channel_id: u64,
    pub time: i64,
}

/// Links a triggered hit to a truth deposit re-expressed in window time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthRelation {
    pub hit: HitKey,
    pub truth: TruthDeposit,
}

/// Links a continuously digitized hit to the deposits it integrated
#[derive(Debug, Clone)]
pub struct TriggerTruthRelation {
    pub hit: DigitizedHit,
    pub truth: SharedDeposit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadoutTimestamp {
    pub system: i32,
    pub time: f64,
}

/// Persistable data of one readout collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadoutData {
    DigitizedHits(Vec<DigitizedHit>),
    WindowHits(Vec<WindowHit>),
    TruthHits(Vec<TruthDeposit>),
    TruthRelations(Vec<TruthRelation>),
    Particles(Vec<McParticle>),
    Timestamps(Vec<ReadoutTimestamp>),
}

impl ReadoutData {
    pub fn len(&self) -> usize {
        match self {
            Self::DigitizedHits(v) => v.len(),
            Self::WindowHits(v) => v.len(),
            Self::TruthHits(v) => v.len(),
            Self::TruthRelations(v) => v.len(),
            Self::Particles(v) => v.len(),
            Self::Timestamps(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_kind(&self, other: &Self) -> bool {
        discriminant(self) == discriminant(other)
    }

    /// Append the contents of another collection of the same kind.
    /// Returns the other collection back if the kinds differ.
    pub fn merge(&mut self, other: Self) -> Result<(), Self> {
        match (self, other) {
            (Self::DigitizedHits(a), Self::DigitizedHits(b)) => a.extend(b),
            (Self::WindowHits(a), Self::WindowHits(b)) => a.extend(b),
            (Self::TruthHits(a), Self::TruthHits(b)) => a.extend(b),
            (Self::TruthRelations(a), Self::TruthRelations(b)) => a.extend(b),
            (Self::Particles(a), Self::Particles(b)) => {
                for p in b {
                    if !a.iter().any(|q| q.id == p.id) {
                        a.push(p);
                    }
                }
            }
            (Self::Timestamps(a), Self::Timestamps(b)) => a.extend(b),
            (_, other) => return Err(other),
        }
        Ok(())
    }
}

/// A named collection handed to the readout event
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredCollection {
    pub name: String,
    pub data: ReadoutData,
}

impl TriggeredCollection {
    pub fn new(name: &str, data: ReadoutData) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }
}

impl StreamElement for DigitizedHit {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::DigitizedHits(items))
    }
}

impl StreamElement for WindowHit {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::WindowHits(items))
    }
}

impl StreamElement for TruthDeposit {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::TruthHits(items))
    }
}

impl StreamElement for SharedDeposit {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::TruthHits(
            items.iter().map(|d| d.as_ref().clone()).collect(),
        ))
    }
}

impl StreamElement for TruthRelation {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::TruthRelations(items))
    }
}

impl StreamElement for McParticle {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::Particles(items))
    }
}

impl StreamElement for ReadoutTimestamp {
    fn to_readout(items: Vec<Self>) -> Option<ReadoutData> {
        Some(ReadoutData::Timestamps(items))
    }
}

// Trigger-path relations only live inside the simulation
impl StreamElement for TriggerTruthRelation {}
