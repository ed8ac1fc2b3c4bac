// Per-channel calibration constants. The database lookup of the real detector is
// replaced by a table carried in the configuration: a default entry used by every
// channel plus explicit per-channel overrides.
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::ConditionsError;

/// Calibration of a single channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConditions {
    /// ADC counts
    pub pedestal: f64,
    /// MeV per ADC count
    pub gain: f64,
    /// Pedestal noise sigma in ADC counts
    pub noise: f64,
    /// Channel time offset in ns
    #[serde(default)]
    pub time_shift: f64,
    #[serde(default)]
    pub bad: bool,
}

impl Default for ChannelConditions {
    fn default() -> Self {
        Self {
            pedestal: 100.0,
            gain: 0.15,
            noise: 1.5,
            time_shift: 0.0,
            bad: false,
        }
    }
}

impl ChannelConditions {
    /// The pedestal as it is seen in the digitized samples
    pub fn adc_pedestal(&self) -> i32 {
        self.pedestal.round() as i32
    }
}

pub trait ConditionsProvider {
    fn conditions(&self, channel_id: u64) -> Result<ChannelConditions, ConditionsError>;
}

/// ConditionsTable maps channel ids to their calibration.
///
/// When `strict` is set, every channel must have an explicit entry and the
/// default is never used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionsTable {
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub default: ChannelConditions,
    #[serde(default)]
    pub channels: FxHashMap<u64, ChannelConditions>,
}

impl ConditionsTable {
    pub fn new(default: ChannelConditions) -> Self {
        Self {
            default,
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel_id: u64, conditions: ChannelConditions) -> Self {
        self.channels.insert(channel_id, conditions);
        self
    }
}

impl ConditionsProvider for ConditionsTable {
    fn conditions(&self, channel_id: u64) -> Result<ChannelConditions, ConditionsError> {
        match self.channels.get(&channel_id) {
            Some(c) => Ok(*c),
            None if self.strict => Err(ConditionsError::MissingChannel(channel_id)),
            None => Ok(self.default),
        }
    }
}
