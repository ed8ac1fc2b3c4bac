use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::GeometryError;

pub trait GeometryProvider {
    fn name(&self) -> &str;
    /// Every readout channel id of the detector, in ascending order
    fn channel_ids(&self) -> Result<Vec<u64>, GeometryError>;
}

/// Generate a unique channel id for an FADC board location
pub fn generate_channel_id(crate_id: u8, slot: u8, channel: u8) -> u64 {
    (channel as u64) + (slot as u64) * 100 + (crate_id as u64) * 10_000
}

/// Inclusive range of channel ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    pub first: u64,
    pub last: u64,
}

/// A set of fully populated FADC boards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadcLayout {
    pub crates: Vec<u8>,
    pub slots: Vec<u8>,
    pub channels_per_slot: u8,
}

impl FadcLayout {
    pub fn channel_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.crates.iter().flat_map(move |cr| {
            self.slots.iter().flat_map(move |sl| {
                (0..self.channels_per_slot).map(move |ch| generate_channel_id(*cr, *sl, ch))
            })
        })
    }
}

/// Detector channels described directly in the configuration. The union of the
/// explicit ids, the ranges and the FADC layout is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub name: String,
    #[serde(default)]
    pub channels: Vec<u64>,
    #[serde(default)]
    pub ranges: Vec<ChannelRange>,
    #[serde(default)]
    pub fadc: Option<FadcLayout>,
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self {
            name: String::from("HPS-Ecal"),
            channels: Vec::new(),
            ranges: vec![ChannelRange {
                first: 1,
                last: 442,
            }],
            fadc: None,
        }
    }
}

impl GeometryProvider for ChannelSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_ids(&self) -> Result<Vec<u64>, GeometryError> {
        let mut ids: BTreeSet<u64> = self.channels.iter().copied().collect();
        for range in self.ranges.iter() {
            if range.first > range.last {
                return Err(GeometryError::BadRange {
                    name: self.name.clone(),
                    first: range.first,
                    last: range.last,
                });
            }
            ids.extend(range.first..=range.last);
        }
        if let Some(layout) = &self.fadc {
            ids.extend(layout.channel_ids());
        }
        if ids.is_empty() {
            return Err(GeometryError::NoChannels(self.name.clone()));
        }
        Ok(ids.into_iter().collect())
    }
}
