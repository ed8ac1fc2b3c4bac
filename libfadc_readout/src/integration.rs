//! Threshold-triggered pulse integration as performed by the FADC firmware.
//!
//! Each channel is either idle or integrating. A channel goes from idle to
//! integrating when a pedestal-subtracted sample exceeds the threshold. The sum
//! is seeded with the `samples_before` samples preceding the crossing plus the
//! crossing itself, and keeps accumulating the `samples_after` samples that follow
//! it, so a full window spans `samples_before + 1 + samples_after` samples. What
//! happens after that depends on how the dead time compares to the window; see
//! [`DeadTimeRegime`].
use bon::bon;

use super::constants::{DEFAULT_DEAD_TIME, PIPELINE_LENGTH, READOUT_PERIOD, TIME_SUBSAMPLES};
use super::error::IntegrationError;
use super::hits::DigitizedHit;
use super::ring_buffer::{AdcBuffer, TruthBuffer};
use super::truth::{SharedDeposit, TruthSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadTimeRegime {
    /// Dead time longer than the window. The record is emitted one sample after
    /// the window closes and the channel stays blind until the dead time from the
    /// crossing has passed.
    Extended,
    /// Dead time equal to the window. Emission and return to idle coincide.
    Matched,
    /// Dead time shorter than the window. After the dead time a new crossing
    /// closes the current record early and starts a new one.
    Retriggerable,
}

impl DeadTimeRegime {
    pub fn select(dead_time: usize, samples_after: usize) -> Self {
        match dead_time.cmp(&samples_after) {
            std::cmp::Ordering::Greater => Self::Extended,
            std::cmp::Ordering::Equal => Self::Matched,
            std::cmp::Ordering::Less => Self::Retriggerable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationSettings {
    pub threshold: i32,
    pub samples_before: usize,
    pub samples_after: usize,
    pub dead_time: usize,
    pub regime: DeadTimeRegime,
    pub keep_truth: bool,
}

#[bon]
impl IntegrationSettings {
    #[builder]
    pub fn new(
        threshold: i32,
        samples_before: usize,
        samples_after: usize,
        #[builder(default = DEFAULT_DEAD_TIME)] dead_time: usize,
        #[builder(default)] keep_truth: bool,
        #[builder(default = PIPELINE_LENGTH)] pipeline_length: usize,
    ) -> Result<Self, IntegrationError> {
        if samples_after == 0 {
            return Err(IntegrationError::NoSamplesAfter);
        }
        if dead_time == 0 {
            return Err(IntegrationError::NoDeadTime);
        }
        if samples_before >= pipeline_length {
            return Err(IntegrationError::WindowTooLong {
                before: samples_before,
                pipeline: pipeline_length,
            });
        }
        Ok(Self {
            threshold,
            samples_before,
            samples_after,
            dead_time,
            regime: DeadTimeRegime::select(dead_time, samples_after),
            keep_truth,
        })
    }
}

/// A closed integration
#[derive(Debug, Clone)]
pub struct IntegrationRecord {
    pub channel_id: u64,
    pub sum: i32,
    /// Sample index of the threshold crossing
    pub start: i64,
    pub truth: TruthSet,
}

impl IntegrationRecord {
    pub fn to_hit(&self) -> DigitizedHit {
        DigitizedHit::new(self.channel_id, self.sum, TIME_SUBSAMPLES * self.start)
    }

    /// Simulation time of the crossing sample
    pub fn time(&self) -> f64 {
        self.start as f64 * READOUT_PERIOD
    }
}

#[derive(Debug, Clone)]
struct Integration {
    start: i64,
    sum: i32,
    truth: TruthSet,
    may_retrigger: bool,
}

#[derive(Debug, Clone, Default)]
enum ChannelState {
    #[default]
    Idle,
    Integrating(Integration),
    /// Record already emitted but the dead time has not passed
    Blind { start: i64 },
}

/// Integration state of one channel
#[derive(Debug, Clone)]
pub struct ChannelIntegrator {
    channel_id: u64,
    pedestal: i32,
    state: ChannelState,
}

impl ChannelIntegrator {
    pub fn new(channel_id: u64, pedestal: i32) -> Self {
        Self {
            channel_id,
            pedestal,
            state: ChannelState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ChannelState::Idle)
    }

    /// Consume the sample just written to offset 0 of `adc`, with index `sample`.
    /// The truth buffer must be aligned with the ADC buffer. Returns the record
    /// closed by this sample, if any.
    pub fn process_sample(
        &mut self,
        sample: i64,
        adc: &AdcBuffer,
        truth: &TruthBuffer<SharedDeposit>,
        settings: &IntegrationSettings,
    ) -> Result<Option<IntegrationRecord>, IntegrationError> {
        let value = adc.get(0)? - self.pedestal;
        let after = settings.samples_after as i64;
        let dead = settings.dead_time as i64;

        let (next, emitted) = match std::mem::take(&mut self.state) {
            ChannelState::Idle => {
                if value > settings.threshold {
                    let run = self.seed(sample, settings.samples_before, adc, truth, settings)?;
                    (ChannelState::Integrating(run), None)
                } else {
                    (ChannelState::Idle, None)
                }
            }
            ChannelState::Blind { start } => {
                if sample >= start + dead {
                    (ChannelState::Idle, None)
                } else {
                    (ChannelState::Blind { start }, None)
                }
            }
            ChannelState::Integrating(mut run) => {
                let start = run.start;
                if sample > start + after {
                    let record = self.retire(run);
                    let next = match settings.regime {
                        DeadTimeRegime::Extended if sample < start + dead => {
                            ChannelState::Blind { start }
                        }
                        _ => ChannelState::Idle,
                    };
                    (next, Some(record))
                } else if settings.regime != DeadTimeRegime::Retriggerable
                    || sample < start + dead
                {
                    self.accumulate(&mut run, value, truth, settings)?;
                    (ChannelState::Integrating(run), None)
                } else if run.may_retrigger && value > settings.threshold {
                    let record = self.retire(run);
                    // The retired record owns every sample before this one
                    let run = self.seed(sample, 0, adc, truth, settings)?;
                    (ChannelState::Integrating(run), Some(record))
                } else {
                    self.accumulate(&mut run, value, truth, settings)?;
                    if value <= settings.threshold {
                        run.may_retrigger = true;
                    }
                    (ChannelState::Integrating(run), None)
                }
            }
        };
        self.state = next;
        Ok(emitted)
    }

    fn seed(
        &self,
        sample: i64,
        lookback: usize,
        adc: &AdcBuffer,
        truth: &TruthBuffer<SharedDeposit>,
        settings: &IntegrationSettings,
    ) -> Result<Integration, IntegrationError> {
        let mut run = Integration {
            start: sample,
            sum: 0,
            truth: TruthSet::default(),
            may_retrigger: false,
        };
        for offset in -(lookback as i64)..=0 {
            run.sum += adc.get(offset)? - self.pedestal;
            if settings.keep_truth {
                run.truth.extend(truth.get(offset)?);
            }
        }
        Ok(run)
    }

    fn accumulate(
        &self,
        run: &mut Integration,
        value: i32,
        truth: &TruthBuffer<SharedDeposit>,
        settings: &IntegrationSettings,
    ) -> Result<(), IntegrationError> {
        run.sum += value;
        if settings.keep_truth {
            run.truth.extend(truth.get(0)?);
        }
        Ok(())
    }

    fn retire(&self, run: Integration) -> IntegrationRecord {
        IntegrationRecord {
            channel_id: self.channel_id,
            sum: run.sum,
            start: run.start,
            truth: run.truth,
        }
    }
}
