use std::ops::RangeInclusive;

use super::constants::{READOUT_PERIOD, TIME_SUBSAMPLES};
use super::error::{ConfigError, TriggerWindowError};
use super::hits::{DigitizedHit, HitKey, ReadoutData, TruthRelation, WindowHit};
use super::ring_buffer::{AdcBuffer, TruthBuffer};
use super::truth::{SharedDeposit, TruthDeposit};

/// Output format of the triggered readout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadoutMode {
    /// Full window of raw samples
    Mode1,
    /// Raw samples around each threshold crossing
    Mode3,
    /// Integral and fine time of each threshold crossing
    Mode7,
}

impl TryFrom<u8> for ReadoutMode {
    type Error = ConfigError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Mode1),
            3 => Ok(Self::Mode3),
            7 => Ok(Self::Mode7),
            _ => Err(ConfigError::UnsupportedMode(value)),
        }
    }
}

/// Read-only view of one channel's pipelines at trigger time
#[derive(Debug, Clone, Copy)]
pub struct ChannelWindow<'a> {
    pub channel_id: u64,
    pub pedestal: i32,
    pub adc: &'a AdcBuffer,
    pub truth: &'a TruthBuffer<SharedDeposit>,
}

/// Everything one trigger produces from a set of channels
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredReadout {
    pub hits: ReadoutData,
    pub truth_hits: Vec<TruthDeposit>,
    pub relations: Vec<TruthRelation>,
    /// Simulation time of the first sample of the window
    pub window_start: f64,
}

/// Threshold crossings of a window and the samples read out around each.
///
/// A crossing is a sample above `level` whose predecessor is at or below it (the
/// first sample of the window only needs to be above). Scanning resumes after
/// the last sample read out for a crossing.
pub fn pulse_ranges(
    window: &[i32],
    level: i32,
    before: usize,
    after: usize,
) -> Vec<(usize, RangeInclusive<usize>)> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < window.len() {
        let rising = window[i] > level && (i == 0 || window[i - 1] <= level);
        if rising {
            let low = i - before.min(i);
            let high = i + after.min(window.len() - 1 - i);
            ranges.push((i, low..=high));
            i = high + 1;
        } else {
            i += 1;
        }
    }
    ranges
}

/// Add the hits of one channel to the readout of a trigger
fn append_channel_hits(
    readout: &mut ReadoutData,
    hits: ReadoutData,
    channel_id: u64,
) -> Result<(), TriggerWindowError> {
    readout
        .merge(hits)
        .map_err(|_| TriggerWindowError::MixedFormats { channel_id })
}

fn to_samples(values: &[i32]) -> Vec<i16> {
    values
        .iter()
        .map(|v| (*v).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect()
}

/// Pulls the readout window for a trigger out of the channel pipelines
#[derive(Debug, Clone)]
pub struct TriggerWindowExtractor {
    pub mode: ReadoutMode,
    /// Window length in samples
    pub window: usize,
    /// Samples between the window start and the trigger
    pub offset: i64,
    pub threshold: i32,
    pub samples_before: usize,
    pub samples_after: usize,
    pub write_truth: bool,
}

impl TriggerWindowExtractor {
    /// Age of the window start in samples when the clock reads `now`
    pub fn readout_latency(&self, now: f64, trigger_time: f64) -> i64 {
        ((now - trigger_time) / READOUT_PERIOD).floor() as i64 + self.offset
    }

    fn check_window(&self, latency: i64, pipeline: usize) -> Result<(), TriggerWindowError> {
        let end = -latency + self.window as i64 - 1;
        if self.window == 0 || end > 0 || latency >= pipeline as i64 {
            return Err(TriggerWindowError::WindowOutsidePipeline {
                window: self.window,
                latency,
                pipeline,
            });
        }
        Ok(())
    }

    /// Raw samples of the window, oldest first
    pub fn adc_window(&self, adc: &AdcBuffer, latency: i64) -> Result<Vec<i32>, TriggerWindowError> {
        self.check_window(latency, adc.capacity())?;
        (0..self.window as i64)
            .map(|i| Ok(*adc.get(i - latency)?))
            .collect()
    }

    /// Deposits of the window plus the slot before it, re-timed to the window start
    pub fn truth_window(
        &self,
        truth: &TruthBuffer<SharedDeposit>,
        latency: i64,
        window_start: f64,
    ) -> Result<Vec<TruthDeposit>, TriggerWindowError> {
        self.check_window(latency, truth.capacity())?;
        let first = (-latency - 1).max(-(truth.capacity() as i64 - 1));
        let last = -latency + self.window as i64 - 1;
        let mut deposits = Vec::new();
        for offset in first..=last {
            for deposit in truth.get(offset)?.iter() {
                deposits.push(deposit.clone_to_time(deposit.time - window_start));
            }
        }
        Ok(deposits)
    }

    /// Hits of one channel in the configured format together with their keys
    fn channel_hits(&self, channel_id: u64, pedestal: i32, window: &[i32]) -> (ReadoutData, Vec<HitKey>) {
        let level = pedestal + self.threshold;
        match self.mode {
            ReadoutMode::Mode1 => {
                if window.iter().any(|v| *v > level) {
                    let hit = WindowHit {
                        channel_id,
                        time: 0,
                        samples: to_samples(window),
                    };
                    (
                        ReadoutData::WindowHits(vec![hit]),
                        vec![HitKey { channel_id, time: 0 }],
                    )
                } else {
                    (ReadoutData::WindowHits(Vec::new()), Vec::new())
                }
            }
            ReadoutMode::Mode3 => {
                let mut hits = Vec::new();
                let mut keys = Vec::new();
                for (crossing, range) in pulse_ranges(window, level, self.samples_before, self.samples_after) {
                    hits.push(WindowHit {
                        channel_id,
                        time: crossing as i32,
                        samples: to_samples(&window[range]),
                    });
                    keys.push(HitKey {
                        channel_id,
                        time: crossing as i64,
                    });
                }
                (ReadoutData::WindowHits(hits), keys)
            }
            ReadoutMode::Mode7 => {
                let mut hits = Vec::new();
                let mut keys = Vec::new();
                for (crossing, range) in pulse_ranges(window, level, self.samples_before, self.samples_after) {
                    let time = TIME_SUBSAMPLES * crossing as i64;
                    hits.push(DigitizedHit::new(channel_id, window[range].iter().sum(), time));
                    keys.push(HitKey { channel_id, time });
                }
                (ReadoutData::DigitizedHits(hits), keys)
            }
        }
    }

    fn empty_hits(&self) -> ReadoutData {
        match self.mode {
            ReadoutMode::Mode1 | ReadoutMode::Mode3 => ReadoutData::WindowHits(Vec::new()),
            ReadoutMode::Mode7 => ReadoutData::DigitizedHits(Vec::new()),
        }
    }

    /// Read out every channel for a trigger. `last_sample` is the index of the
    /// sample at offset 0 of the pipelines when the clock reads `now`.
    pub fn extract<'a>(
        &self,
        channels: impl IntoIterator<Item = ChannelWindow<'a>>,
        now: f64,
        trigger_time: f64,
        last_sample: i64,
    ) -> Result<TriggeredReadout, TriggerWindowError> {
        let latency = self.readout_latency(now, trigger_time);
        let window_start = (last_sample - latency) as f64 * READOUT_PERIOD;
        let mut readout = TriggeredReadout {
            hits: self.empty_hits(),
            truth_hits: Vec::new(),
            relations: Vec::new(),
            window_start,
        };

        for channel in channels {
            let window = self.adc_window(channel.adc, latency)?;
            let (hits, keys) = self.channel_hits(channel.channel_id, channel.pedestal, &window);
            if keys.is_empty() {
                continue;
            }
            append_channel_hits(&mut readout.hits, hits, channel.channel_id)?;

            if self.write_truth {
                let truth = self.truth_window(channel.truth, latency, window_start)?;
                for key in keys.iter() {
                    for deposit in truth.iter() {
                        readout.relations.push(TruthRelation {
                            hit: *key,
                            truth: deposit.clone(),
                        });
                    }
                }
                readout.truth_hits.extend(truth);
            }
        }
        Ok(readout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PIPELINE_LENGTH;
    use crate::ring_buffer::{adc_buffer, truth_buffer};
    use std::sync::Arc;

    const PEDESTAL: i32 = 100;

    fn extractor(mode: ReadoutMode, window: usize) -> TriggerWindowExtractor {
        TriggerWindowExtractor {
            mode,
            window,
            offset: 0,
            threshold: 10,
            samples_before: 1,
            samples_after: 2,
            write_truth: true,
        }
    }

    #[test]
    fn test_modes() {
        assert_eq!(ReadoutMode::try_from(3).unwrap(), ReadoutMode::Mode3);
        assert!(matches!(
            ReadoutMode::try_from(2),
            Err(ConfigError::UnsupportedMode(2))
        ));
    }

    #[test]
    fn test_pulse_ranges() {
        let w = [150, 100, 100, 130, 140, 100, 100, 100, 100, 120];
        let ranges = pulse_ranges(&w, 110, 1, 2);
        assert_eq!(ranges, vec![(0, 0..=2), (3, 2..=5), (9, 8..=9)]);
    }

    #[test]
    fn test_pulse_ranges_resume_after_range() {
        let w = [100, 100, 100, 130, 105, 140, 100, 100];
        let ranges = pulse_ranges(&w, 110, 0, 1);
        assert_eq!(ranges, vec![(3, 3..=4), (5, 5..=6)]);
        // 5 follows a sample above threshold so it does not start a new pulse
        let w = [100, 100, 100, 130, 120, 140, 100, 100];
        let ranges = pulse_ranges(&w, 110, 0, 1);
        assert_eq!(ranges, vec![(3, 3..=4)]);
    }

    #[test]
    fn test_window_bounds() {
        let adc = adc_buffer(PIPELINE_LENGTH, PEDESTAL).unwrap();
        let ex = extractor(ReadoutMode::Mode1, 10);
        assert!(ex.adc_window(&adc, 9).is_ok());
        assert!(ex.adc_window(&adc, 8).is_err());
        assert!(ex.adc_window(&adc, PIPELINE_LENGTH as i64 - 1).is_ok());
        assert!(ex.adc_window(&adc, PIPELINE_LENGTH as i64).is_err());
    }

    #[test]
    fn test_latency() {
        let mut ex = extractor(ReadoutMode::Mode1, 10);
        ex.offset = 36;
        assert_eq!(ex.readout_latency(500.0, 100.0), 136);
        assert_eq!(ex.readout_latency(503.0, 100.0), 136);
    }

    /// Pipelines holding `samples` with the last value at offset 0
    fn pipelines(samples: &[i32]) -> (AdcBuffer, TruthBuffer<SharedDeposit>) {
        let mut adc = adc_buffer(PIPELINE_LENGTH, PEDESTAL).unwrap();
        let mut truth = truth_buffer(PIPELINE_LENGTH).unwrap();
        for (i, v) in samples.iter().enumerate() {
            adc.step_forward();
            truth.step_forward();
            adc.set(0, *v).unwrap();
            if *v > PEDESTAL {
                truth
                    .push(0, Arc::new(TruthDeposit::new(4, 1.0, i as f64 * READOUT_PERIOD + 1.0)))
                    .unwrap();
            }
        }
        (adc, truth)
    }

    #[test]
    fn test_extract_all_formats() {
        // 20 samples, window is the first 10 (indices 0..=9)
        let mut samples = vec![PEDESTAL; 20];
        samples[0] = 140;
        samples[9] = 150;
        samples[15] = 200;
        let (adc, truth) = pipelines(&samples);
        let last_sample = 19;
        let channel = ChannelWindow {
            channel_id: 4,
            pedestal: PEDESTAL,
            adc: &adc,
            truth: &truth,
        };
        // latency 19 puts the window start 19 samples back
        let now = 19.0 * READOUT_PERIOD;

        let ex = extractor(ReadoutMode::Mode1, 10);
        let out = ex.extract([channel], now, 0.0, last_sample).unwrap();
        assert_eq!(out.window_start, 0.0);
        match &out.hits {
            ReadoutData::WindowHits(h) => {
                assert_eq!(h.len(), 1);
                assert_eq!(h[0].samples.len(), 10);
                assert_eq!(h[0].samples[0], 140);
                assert_eq!(h[0].samples[9], 150);
            }
            other => panic!("unexpected {other:?}"),
        }
        // deposits at samples 0 and 9, the one at 15 is outside the window
        assert_eq!(out.truth_hits.len(), 2);
        assert_eq!(out.truth_hits[0].time, 1.0);
        assert_eq!(out.relations.len(), 2);

        let ex = extractor(ReadoutMode::Mode3, 10);
        let out = ex.extract([channel], now, 0.0, last_sample).unwrap();
        match &out.hits {
            ReadoutData::WindowHits(h) => {
                assert_eq!(h.len(), 2);
                assert_eq!(h[0].time, 0);
                assert_eq!(h[0].samples, vec![140, 100, 100]);
                assert_eq!(h[1].time, 9);
                assert_eq!(h[1].samples, vec![100, 150]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.relations.len(), 4);

        let ex = extractor(ReadoutMode::Mode7, 10);
        let out = ex.extract([channel], now, 0.0, last_sample).unwrap();
        assert_eq!(
            out.hits,
            ReadoutData::DigitizedHits(vec![
                DigitizedHit::new(4, 340, 0),
                DigitizedHit::new(4, 250, 9 * TIME_SUBSAMPLES),
            ])
        );
    }

    #[test]
    fn test_pulse_covering_window_matches_full_readout() {
        // One crossing at 3 in a 10 sample window
        let samples = [100, 102, 105, 150, 180, 160, 130, 115, 108, 104];
        let (adc, truth) = pipelines(&samples);
        let channel = ChannelWindow {
            channel_id: 4,
            pedestal: PEDESTAL,
            adc: &adc,
            truth: &truth,
        };
        let now = 9.0 * READOUT_PERIOD;
        let full = match extractor(ReadoutMode::Mode1, 10)
            .extract([channel], now, 0.0, 9)
            .unwrap()
            .hits
        {
            ReadoutData::WindowHits(h) => h[0].samples.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(full.len(), 10);
        let window_sum: i32 = samples.iter().sum();

        // Any before >= 3 reaches the window start, any after >= 6 reaches its end
        for (before, after) in [(3, 6), (5, 6), (3, 9), (20, 20)] {
            let mut ex = extractor(ReadoutMode::Mode3, 10);
            ex.samples_before = before;
            ex.samples_after = after;
            match ex.extract([channel], now, 0.0, 9).unwrap().hits {
                ReadoutData::WindowHits(h) => {
                    assert_eq!(h.len(), 1);
                    assert_eq!(h[0].time, 3);
                    assert_eq!(h[0].samples, full);
                }
                other => panic!("unexpected {other:?}"),
            }

            ex.mode = ReadoutMode::Mode7;
            assert_eq!(
                ex.extract([channel], now, 0.0, 9).unwrap().hits,
                ReadoutData::DigitizedHits(vec![DigitizedHit::new(
                    4,
                    window_sum,
                    3 * TIME_SUBSAMPLES
                )])
            );
        }

        // Fewer samples before than the crossing index leaves the window start out
        let mut ex = extractor(ReadoutMode::Mode3, 10);
        ex.samples_before = 2;
        ex.samples_after = 7;
        match ex.extract([channel], now, 0.0, 9).unwrap().hits {
            ReadoutData::WindowHits(h) => assert_eq!(h[0].samples, full[1..].to_vec()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mixed_formats_are_an_error() {
        let mut readout = ReadoutData::DigitizedHits(vec![DigitizedHit::new(1, 10, 0)]);
        let hits = ReadoutData::WindowHits(vec![WindowHit {
            channel_id: 2,
            time: 0,
            samples: vec![100],
        }]);
        assert!(matches!(
            append_channel_hits(&mut readout, hits, 2),
            Err(TriggerWindowError::MixedFormats { channel_id: 2 })
        ));
        assert_eq!(readout.len(), 1);

        let hits = ReadoutData::DigitizedHits(vec![DigitizedHit::new(2, 20, 64)]);
        append_channel_hits(&mut readout, hits, 2).unwrap();
        assert_eq!(readout.len(), 2);
    }

    #[test]
    fn test_quiet_channel() {
        let (adc, truth) = pipelines(&vec![PEDESTAL; 20]);
        let channel = ChannelWindow {
            channel_id: 4,
            pedestal: PEDESTAL,
            adc: &adc,
            truth: &truth,
        };
        let ex = extractor(ReadoutMode::Mode1, 10);
        let out = ex
            .extract([channel], 19.0 * READOUT_PERIOD, 0.0, 19)
            .unwrap();
        assert!(out.hits.is_empty());
        assert!(out.truth_hits.is_empty());
    }
}
