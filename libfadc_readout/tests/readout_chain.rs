use std::sync::Arc;

use libfadc_readout::config::Config;
use libfadc_readout::constants::{ADC_SCALE, READOUT_PERIOD, SYSTEM_ECAL, SYSTEM_TRIGGER_TIME};
use libfadc_readout::data_manager::{Producer, ReadoutDataManager};
use libfadc_readout::digitizer::Digitizer;
use libfadc_readout::error::WriterError;
use libfadc_readout::event_builder::ReadoutEvent;
use libfadc_readout::geometry::ChannelSet;
use libfadc_readout::hits::{DigitizedHit, ReadoutData};
use libfadc_readout::process::process_scenario;
use libfadc_readout::pulse::PulseShape;
use libfadc_readout::scenario::Scenario;
use libfadc_readout::truth::{McParticle, ParticleContribution, SharedDeposit, TruthDeposit};
use libfadc_readout::writer::ReadoutWriter;

const GAIN: f64 = 0.02;
const ENERGY: f64 = 10.0;
const DEPOSIT_TIME: f64 = 400.0;
const PEDESTAL: i32 = 100;

#[derive(Debug, Default)]
struct VecWriter {
    events: Vec<ReadoutEvent>,
    closed: bool,
}

impl ReadoutWriter for VecWriter {
    fn write_event(&mut self, event: &ReadoutEvent) -> Result<(), WriterError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriterError> {
        self.closed = true;
        Ok(())
    }
}

fn config(mode: u8) -> Config {
    Config {
        geometry: ChannelSet {
            name: String::from("test"),
            channels: vec![41, 42, 43],
            ranges: vec![],
            fadc: None,
        },
        add_noise: false,
        fixed_gain: Some(GAIN),
        mode,
        ..Default::default()
    }
}

/// Pedestal-subtracted ADC value of the j-th sample after a deposit at a sample boundary
fn expected_sample(j: i64) -> i32 {
    let dt = (j + 1) as f64 * READOUT_PERIOD;
    let volts = ENERGY * PulseShape::ThreePole.amplitude(dt, 9.6) * READOUT_PERIOD / (GAIN * ADC_SCALE);
    (volts * ADC_SCALE).round() as i32
}

/// Samples between the deposit and the first sample above threshold
fn samples_to_crossing(threshold: i32) -> i64 {
    (0..50).find(|j| expected_sample(*j) > threshold).unwrap()
}

fn expected_crossing(threshold: i32) -> i64 {
    samples_to_crossing(threshold) + (DEPOSIT_TIME / READOUT_PERIOD) as i64
}

fn scenario(trigger: f64) -> Scenario {
    Scenario {
        particles: vec![McParticle {
            id: 1,
            pdg: 22,
            energy: ENERGY,
            time: DEPOSIT_TIME,
            parents: vec![],
            daughters: vec![],
        }],
        deposits: vec![
            TruthDeposit::new(42, ENERGY, DEPOSIT_TIME).with_contribution(ParticleContribution {
                particle_id: 1,
                pdg: 22,
                energy: ENERGY,
                time: DEPOSIT_TIME,
            }),
        ],
        triggers: vec![trigger],
    }
}

fn run(config: &Config) -> Vec<ReadoutEvent> {
    let mut writer = VecWriter::default();
    let summary = process_scenario(config, scenario(528.0), 7, &mut writer, |_| Ok(())).unwrap();
    assert!(writer.closed);
    assert_eq!(summary.events_written, 1);
    assert_eq!(summary.digitized_hits, 1);
    writer.events
}

/// Sample index of the first sample of the readout window
fn window_start_sample(event: &ReadoutEvent) -> i64 {
    let ReadoutData::Timestamps(stamps) = &event.collections["ReadoutTimestamps"] else {
        panic!("timestamps have the wrong type");
    };
    let ecal = stamps.iter().find(|s| s.system == SYSTEM_ECAL).unwrap();
    assert!(stamps
        .iter()
        .any(|s| s.system == SYSTEM_TRIGGER_TIME && s.time == event.trigger_time));
    (ecal.time / READOUT_PERIOD) as i64
}

/// Run the digitizer alone over a single deposit on channel 42 and collect its hits
fn integrate_deposit(config: &Config, time: f64) -> Vec<DigitizedHit> {
    let mut manager = ReadoutDataManager::new(config.persistent_window, config.persistent_offset);
    let truth = Producer::new("truth", 0.0);
    manager
        .register::<SharedDeposit>(&config.collections.truth_hits, &truth, &[])
        .unwrap();
    let mut digitizer = Digitizer::new(config, 0).unwrap();
    digitizer.register_streams(&mut manager).unwrap();
    digitizer
        .detector_changed(&config.geometry, &config.conditions)
        .unwrap();
    manager.start_of_data().unwrap();

    let end = time + 400.0;
    while manager.current_time() < end {
        if manager.current_time() == time {
            let deposit = Arc::new(TruthDeposit::new(42, ENERGY, time));
            manager
                .append(&config.collections.truth_hits, None, vec![deposit])
                .unwrap();
        }
        digitizer.process(&mut manager).unwrap();
        manager.advance();
    }

    manager
        .query(&config.collections.digitized_hits, 0.0, end)
        .unwrap()
}

#[test]
fn single_deposit_integrates_once() {
    let config = config(1);
    let hits = integrate_deposit(&config, DEPOSIT_TIME);
    assert_eq!(hits.len(), 1);
    let hit = hits[0];
    assert_eq!(hit.channel_id, 42);
    assert_eq!(hit.time, 64 * expected_crossing(config.integration_threshold));

    // The integral is the deposited energy over the gain, up to per-sample rounding
    let nominal = (ENERGY / GAIN) as i32;
    assert!((hit.amplitude - nominal).abs() < 20, "{}", hit.amplitude);
}

#[test]
fn deposit_at_start_of_run() {
    // 10 MeV at t = 0 on channel 42 with a 0.02 MeV/ADC gain, default front end
    let config = config(1);
    assert_eq!(config.fixed_gain, Some(GAIN));
    assert_eq!(config.integration_threshold, 18);
    let hits = integrate_deposit(&config, 0.0);

    // Only channel 42 fires, once, where the pulse first exceeds pedestal + 18 = 118
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].channel_id, 42);
    let crossing = samples_to_crossing(config.integration_threshold);
    assert!(PEDESTAL + expected_sample(crossing) > 118);
    assert!(PEDESTAL + expected_sample(crossing - 1) <= 118);
    assert_eq!(crossing, 1);
    assert_eq!(hits[0].time, 64 * crossing);
    let nominal = (ENERGY / GAIN) as i32;
    assert!((hits[0].amplitude - nominal).abs() < 20, "{}", hits[0].amplitude);
}

#[test]
fn deposit_below_threshold_with_conditions_gain() {
    // The default conditions gain of 0.15 MeV/ADC puts a 10 MeV pulse peak near 7 ADC
    let config = Config {
        fixed_gain: None,
        ..config(1)
    };
    assert!(integrate_deposit(&config, 0.0).is_empty());
}

#[test]
fn mode1_reads_whole_window() {
    let config = config(1);
    let events = run(&config);
    let event = &events[0];
    assert_eq!(event.trigger_time, 528.0);

    let ReadoutData::WindowHits(hits) = &event.collections["EcalReadoutHits"] else {
        panic!("mode 1 produces window hits");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].channel_id, 42);
    assert_eq!(hits[0].samples.len(), config.readout_window);

    let crossing = (expected_crossing(config.integration_threshold) - window_start_sample(event)) as usize;
    assert!(crossing > 0 && crossing < config.readout_window);
    assert!(hits[0].samples[crossing] as i32 > PEDESTAL + config.integration_threshold);
    assert!(hits[0].samples[crossing - 1] as i32 <= PEDESTAL + config.integration_threshold);
    assert_eq!(hits[0].samples[0] as i32, PEDESTAL);
    assert!(!event.collections.contains_key("EcalHits"));
}

#[test]
fn mode3_reads_pulse() {
    let config = config(3);
    let events = run(&config);
    let event = &events[0];

    let ReadoutData::WindowHits(hits) = &event.collections["EcalReadoutHits"] else {
        panic!("mode 3 produces window hits");
    };
    assert_eq!(hits.len(), 1);
    let crossing = expected_crossing(config.integration_threshold) - window_start_sample(event);
    assert_eq!(hits[0].time as i64, crossing);

    let before = config.number_samples_before.min(crossing as usize);
    assert_eq!(hits[0].samples.len(), before + 1 + config.number_samples_after);
    assert!(hits[0].samples[before] as i32 > PEDESTAL + config.integration_threshold);
}

#[test]
fn mode7_sums_pulse() {
    let config = config(7);
    let events = run(&config);
    let event = &events[0];

    let ReadoutData::DigitizedHits(hits) = &event.collections["EcalReadoutHits"] else {
        panic!("mode 7 produces digitized hits");
    };
    assert_eq!(hits.len(), 1);
    let crossing = expected_crossing(config.integration_threshold) - window_start_sample(event);
    assert_eq!(hits[0].time, 64 * crossing);

    // Raw sum, pedestal included
    let before = config.number_samples_before.min(crossing as usize);
    let n_samples = (before + 1 + config.number_samples_after) as i32;
    let nominal = n_samples * PEDESTAL + (ENERGY / GAIN) as i32;
    assert!((hits[0].amplitude - nominal).abs() < 20, "{}", hits[0].amplitude);
}

#[test]
fn truth_follows_readout() {
    let mut config = config(3);
    config.write_truth = true;
    let events = run(&config);
    let event = &events[0];
    let window_start = window_start_sample(event) as f64 * READOUT_PERIOD;

    let ReadoutData::TruthHits(truth) = &event.collections["EcalHits"] else {
        panic!("truth hits have the wrong type");
    };
    assert_eq!(truth.len(), 1);
    assert_eq!(truth[0].channel_id, 42);
    assert_eq!(truth[0].time, DEPOSIT_TIME - window_start);
    assert_eq!(truth[0].contributions[0].particle_id, 1);

    let ReadoutData::TruthRelations(relations) = &event.collections["EcalTruthRelations"] else {
        panic!("truth relations have the wrong type");
    };
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].hit.channel_id, 42);

    let ReadoutData::Particles(particles) = &event.collections["MCParticle"] else {
        panic!("particles have the wrong type");
    };
    assert_eq!(particles.len(), 1);
    assert_eq!(particles[0].pdg, 22);
}

#[test]
fn persisted_input_is_written_around_trigger() {
    let mut config = config(1);
    config.persist_truth_input = true;
    let mut writer = VecWriter::default();
    process_scenario(&config, scenario(440.0), 7, &mut writer, |_| Ok(())).unwrap();

    let event = &writer.events[0];
    let ReadoutData::TruthHits(truth) = &event.collections["EcalHits"] else {
        panic!("persisted deposits have the wrong type");
    };
    // Input deposits keep their simulation time
    assert_eq!(truth.len(), 1);
    assert_eq!(truth[0].time, DEPOSIT_TIME);
}
