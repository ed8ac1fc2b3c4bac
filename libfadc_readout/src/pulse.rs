use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

use super::conditions::ChannelConditions;
use super::constants::{
    ADC_SCALE, DOUBLE_GAUSSIAN_FALL, DOUBLE_GAUSSIAN_RISE, READOUT_PERIOD,
};
use super::error::PulseError;
use super::ring_buffer::VoltageBuffer;
use super::truth::TruthDeposit;

/// Analog pulse shape families emulating the preamplifier/shaper response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseShape {
    CRRC,
    DoubleGaussian,
    #[default]
    ThreePole,
}

impl FromStr for PulseShape {
    type Err = PulseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRRC" => Ok(Self::CRRC),
            "DoubleGaussian" => Ok(Self::DoubleGaussian),
            "ThreePole" => Ok(Self::ThreePole),
            _ => Err(PulseError::UnknownShape(s.to_string())),
        }
    }
}

fn gaussian(x: f64, sigma: f64) -> f64 {
    (-0.5 * (x / sigma).powi(2)).exp()
}

impl PulseShape {
    /// Unit-area pulse height `time` ns after the deposit. Zero before the deposit.
    pub fn amplitude(&self, time: f64, shaping_time: f64) -> f64 {
        if time <= 0.0 {
            return 0.0;
        }
        match self {
            // peak at tp
            Self::CRRC => time / shaping_time.powi(2) * (-time / shaping_time).exp(),
            // peak at 3 * rise
            Self::DoubleGaussian => {
                let norm = (DOUBLE_GAUSSIAN_RISE + DOUBLE_GAUSSIAN_FALL) / 2.0 * (2.0 * PI).sqrt();
                let peak = 3.0 * DOUBLE_GAUSSIAN_RISE;
                let sigma = if time < peak {
                    DOUBLE_GAUSSIAN_RISE
                } else {
                    DOUBLE_GAUSSIAN_FALL
                };
                gaussian(time - peak, sigma) / norm
            }
            // peak at 2 * tp
            Self::ThreePole => {
                time.powi(2) / (2.0 * shaping_time.powi(3)) * (-time / shaping_time).exp()
            }
        }
    }

    fn needs_shaping_time(&self) -> bool {
        !matches!(self, Self::DoubleGaussian)
    }
}

/// Converts truth deposits into voltage on a channel's analog look-ahead.
#[derive(Debug, Clone)]
pub struct PulseModel {
    shape: PulseShape,
    shaping_time: f64,
    fixed_gain: Option<f64>,
    pe_per_mev: Option<f64>,
    rng: StdRng,
}

impl PulseModel {
    /// `pe_per_mev` enables photostatistics and electronic noise when given.
    pub fn new(
        shape: PulseShape,
        shaping_time: f64,
        fixed_gain: Option<f64>,
        pe_per_mev: Option<f64>,
        seed: u64,
    ) -> Result<Self, PulseError> {
        if shape.needs_shaping_time() && !(shaping_time > 0.0) {
            return Err(PulseError::BadShapingTime(shaping_time));
        }
        if let Some(pe) = pe_per_mev {
            if !(pe > 0.0) {
                return Err(PulseError::BadPhotoelectrons(pe));
            }
        }
        Ok(Self {
            shape,
            shaping_time,
            fixed_gain,
            pe_per_mev,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn amplitude(&self, time: f64) -> f64 {
        self.shape.amplitude(time, self.shaping_time)
    }

    /// MeV per ADC count used for a channel
    pub fn gain(&self, channel_id: u64, conditions: &ChannelConditions) -> Result<f64, PulseError> {
        let gain = self.fixed_gain.unwrap_or(conditions.gain);
        if !(gain > 0.0) {
            return Err(PulseError::BadGain { channel_id, gain });
        }
        Ok(gain)
    }

    /// Volts per MeV of unit-area pulse sampled over one readout period
    pub fn voltage_gain(
        &self,
        channel_id: u64,
        conditions: &ChannelConditions,
    ) -> Result<f64, PulseError> {
        Ok(READOUT_PERIOD / (self.gain(channel_id, conditions)? * ADC_SCALE))
    }

    /// Deposit energy after photostatistics and electronic noise, if enabled.
    /// The electronic noise is scaled by the calibrated channel gain.
    pub fn smeared_energy(
        &mut self,
        energy: f64,
        conditions: &ChannelConditions,
    ) -> Result<f64, PulseError> {
        let Some(pe_per_mev) = self.pe_per_mev else {
            return Ok(energy);
        };
        let variance = (conditions.noise * conditions.gain).powi(2) + energy / pe_per_mev;
        let sigma = variance.max(0.0).sqrt();
        let normal = Normal::new(0.0, sigma)?;
        Ok(energy + normal.sample(&mut self.rng))
    }

    /// Add the pulse of `deposit` to every slot of the voltage look-ahead. Slot `i`
    /// is sampled at `readout_time + (i + 1) * period`.
    pub fn deposit_to_voltage(
        &mut self,
        deposit: &TruthDeposit,
        conditions: &ChannelConditions,
        readout_time: f64,
        buffer: &mut VoltageBuffer,
    ) -> Result<(), PulseError> {
        if deposit.time < readout_time {
            return Err(PulseError::Causality {
                channel_id: deposit.channel_id,
                time: deposit.time,
                horizon: readout_time,
            });
        }
        let gain = self.voltage_gain(deposit.channel_id, conditions)?;
        let energy = self.smeared_energy(deposit.energy, conditions)?;
        for slot in 0..buffer.capacity() {
            let sample_time = readout_time + (slot + 1) as f64 * READOUT_PERIOD;
            let dt = sample_time - deposit.time - conditions.time_shift;
            buffer.accumulate(slot as i64, energy * self.amplitude(dt) * gain)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::voltage_buffer;

    fn integrate(shape: PulseShape, tp: f64) -> f64 {
        let step = 0.01;
        (1..200_000)
            .map(|i| shape.amplitude(i as f64 * step, tp) * step)
            .sum()
    }

    #[test]
    fn test_unit_area() {
        assert!((integrate(PulseShape::CRRC, 9.6) - 1.0).abs() < 1.0e-3);
        assert!((integrate(PulseShape::ThreePole, 9.6) - 1.0).abs() < 1.0e-3);
        // The rising half of the double gaussian is cut at zero
        assert!((integrate(PulseShape::DoubleGaussian, 0.0) - 1.0).abs() < 2.0e-2);
    }

    #[test]
    fn test_causal() {
        for shape in [PulseShape::CRRC, PulseShape::DoubleGaussian, PulseShape::ThreePole] {
            assert_eq!(shape.amplitude(0.0, 9.6), 0.0);
            assert_eq!(shape.amplitude(-3.0, 9.6), 0.0);
        }
    }

    #[test]
    fn test_peaks() {
        let tp = 9.6;
        let crrc = PulseShape::CRRC;
        assert!(crrc.amplitude(tp, tp) > crrc.amplitude(tp - 0.1, tp));
        assert!(crrc.amplitude(tp, tp) > crrc.amplitude(tp + 0.1, tp));
        let three = PulseShape::ThreePole;
        assert!(three.amplitude(2.0 * tp, tp) > three.amplitude(2.0 * tp - 0.1, tp));
        assert!(three.amplitude(2.0 * tp, tp) > three.amplitude(2.0 * tp + 0.1, tp));
        let gauss = PulseShape::DoubleGaussian;
        let peak = 3.0 * DOUBLE_GAUSSIAN_RISE;
        assert!(gauss.amplitude(peak, tp) > gauss.amplitude(peak - 0.1, tp));
        assert!(gauss.amplitude(peak, tp) > gauss.amplitude(peak + 0.1, tp));
    }

    #[test]
    fn test_single_peak_and_non_negative() {
        let tp = 9.6;
        for shape in [PulseShape::CRRC, PulseShape::DoubleGaussian, PulseShape::ThreePole] {
            let values: Vec<f64> = (0..20_000)
                .map(|i| shape.amplitude(i as f64 * 0.01, tp))
                .collect();
            assert!(values.iter().all(|v| *v >= 0.0), "{shape:?}");
            let top = values
                .iter()
                .enumerate()
                .fold(0, |best, (i, v)| if *v > values[best] { i } else { best });
            assert!(top > 0, "{shape:?}");
            assert!(values[..=top].windows(2).all(|w| w[0] <= w[1]), "{shape:?}");
            assert!(values[top..].windows(2).all(|w| w[0] >= w[1]), "{shape:?}");
        }
    }

    #[test]
    fn test_shape_keywords() {
        assert_eq!(PulseShape::from_str("CRRC").unwrap(), PulseShape::CRRC);
        assert!(PulseShape::from_str("Square").is_err());
    }

    #[test]
    fn test_bad_parameters() {
        assert!(PulseModel::new(PulseShape::ThreePole, 0.0, None, None, 0).is_err());
        assert!(PulseModel::new(PulseShape::DoubleGaussian, 0.0, None, None, 0).is_ok());
        assert!(PulseModel::new(PulseShape::CRRC, 9.6, None, Some(0.0), 0).is_err());
    }

    #[test]
    fn test_deposit_to_voltage() {
        let conditions = ChannelConditions::default();
        let mut model = PulseModel::new(PulseShape::ThreePole, 9.6, Some(0.5), None, 0).unwrap();
        let mut buffer = voltage_buffer(100).unwrap();
        let deposit = TruthDeposit::new(3, 100.0, 10.0);
        model
            .deposit_to_voltage(&deposit, &conditions, 8.0, &mut buffer)
            .unwrap();
        let gain = READOUT_PERIOD / (0.5 * ADC_SCALE);
        for slot in 0..100 {
            let dt = 8.0 + (slot + 1) as f64 * READOUT_PERIOD - 10.0;
            let expected = 100.0 * model.amplitude(dt) * gain;
            assert!((buffer.get(slot).unwrap() - expected).abs() < 1.0e-12);
        }
    }

    #[test]
    fn test_causality_error() {
        let conditions = ChannelConditions::default();
        let mut model = PulseModel::new(PulseShape::ThreePole, 9.6, None, None, 0).unwrap();
        let mut buffer = voltage_buffer(100).unwrap();
        let deposit = TruthDeposit::new(3, 100.0, 3.0);
        assert!(matches!(
            model.deposit_to_voltage(&deposit, &conditions, 4.0, &mut buffer),
            Err(PulseError::Causality { .. })
        ));
    }

    #[test]
    fn test_noise_is_seeded() {
        let conditions = ChannelConditions::default();
        let mut a = PulseModel::new(PulseShape::ThreePole, 9.6, None, Some(32.8), 42).unwrap();
        let mut b = PulseModel::new(PulseShape::ThreePole, 9.6, None, Some(32.8), 42).unwrap();
        let ea = a.smeared_energy(50.0, &conditions).unwrap();
        let eb = b.smeared_energy(50.0, &conditions).unwrap();
        assert_eq!(ea, eb);
        assert_ne!(ea, 50.0);
    }
}
