use fxhash::FxHashMap;

use super::conditions::{ChannelConditions, ConditionsProvider};
use super::config::{CollectionNames, Config, Subsystem};
use super::constants::{
    ADC_OVERFLOW, ADC_SCALE, BEAM_BUNCH_SIZE, PIPELINE_LENGTH, READOUT_PERIOD,
    VOLTAGE_BUFFER_LENGTH,
};
use super::data_manager::{Producer, ReadoutDataManager, Trigger};
use super::error::DigitizerError;
use super::geometry::GeometryProvider;
use super::hits::{
    DigitizedHit, ReadoutData, ReadoutTimestamp, TriggerTruthRelation, TriggeredCollection,
};
use super::integration::{ChannelIntegrator, IntegrationRecord, IntegrationSettings};
use super::pulse::PulseModel;
use super::ring_buffer::{
    adc_buffer, truth_buffer, voltage_buffer, AdcBuffer, TruthBuffer, VoltageBuffer,
};
use super::trigger_window::{ChannelWindow, TriggerWindowExtractor};
use super::truth::{ParticleTable, SharedDeposit};

/// Everything the digitizer keeps for one channel
#[derive(Debug, Clone)]
struct ChannelPipeline {
    channel_id: u64,
    conditions: ChannelConditions,
    pedestal: i32,
    voltage: VoltageBuffer,
    adc: AdcBuffer,
    truth: TruthBuffer<SharedDeposit>,
    /// Deposits of the sample period that has not been digitized yet
    pending: Vec<SharedDeposit>,
    integrator: ChannelIntegrator,
}

impl ChannelPipeline {
    fn new(channel_id: u64, conditions: ChannelConditions) -> Result<Self, DigitizerError> {
        let pedestal = conditions.adc_pedestal();
        Ok(Self {
            channel_id,
            conditions,
            pedestal,
            voltage: voltage_buffer(VOLTAGE_BUFFER_LENGTH)?,
            adc: adc_buffer(PIPELINE_LENGTH, pedestal)?,
            truth: truth_buffer(PIPELINE_LENGTH)?,
            pending: Vec::new(),
            integrator: ChannelIntegrator::new(channel_id, pedestal),
        })
    }

    /// Digitize the next voltage sample and run it through the integrator
    fn read_sample(
        &mut self,
        sample: i64,
        settings: &IntegrationSettings,
    ) -> Result<Option<IntegrationRecord>, DigitizerError> {
        self.adc.step_forward();
        self.truth.step_forward();
        for deposit in self.pending.drain(..) {
            self.truth.push(0, deposit)?;
        }

        let volts = *self.voltage.get(0)?;
        let digitized = (self.pedestal as f64 + volts * ADC_SCALE).round() as i32;
        self.adc.set(0, digitized.min(ADC_OVERFLOW))?;
        self.voltage.step_forward();

        if self.conditions.bad {
            return Ok(None);
        }
        Ok(self
            .integrator
            .process_sample(sample, &self.adc, &self.truth, settings)?)
    }
}

/// Digitizer emulates the FADC boards of one subsystem.
///
/// Every simulation step it turns the new truth deposits into pulses on the
/// analog look-ahead of their channel, then digitizes and integrates every
/// sample period that has become complete. Integrated hits go to the
/// continuous digitized-hit stream for the trigger simulation. When a trigger is
/// read out the digitizer supplies the readout window of every channel in the
/// configured output format.
#[derive(Debug)]
pub struct Digitizer {
    names: CollectionNames,
    subsystem: Subsystem,
    producer: Producer,
    pulse: PulseModel,
    integration: IntegrationSettings,
    extractor: TriggerWindowExtractor,
    write_truth: bool,
    write_trigger_truth: bool,
    channels: FxHashMap<u64, ChannelPipeline>,
    channel_order: Vec<u64>,
    particles: ParticleTable,
    readout_counter: i64,
    hits_emitted: u64,
}

impl Digitizer {
    pub fn new(config: &Config, seed: u64) -> Result<Self, DigitizerError> {
        config.validate()?;
        let integration = config.integration_settings()?;
        let extractor = config.trigger_window()?;
        let pulse = PulseModel::new(
            config.pulse_shape,
            config.pulse_time_parameter,
            config.fixed_gain,
            config.pe_per_mev(),
            seed,
        )?;

        // A record closes on the sample after its last one, which is read two samples
        // past the final window sample
        let local_latency = READOUT_PERIOD * (config.number_samples_after + 2) as f64;
        let output_samples = (config.readout_window as i64 - config.readout_offset).max(0);
        let producer = Producer::new(&format!("{:?}Digitizer", config.subsystem), local_latency)
            .with_local_output_time(READOUT_PERIOD * output_samples as f64);

        Ok(Self {
            names: config.collections.clone(),
            subsystem: config.subsystem,
            producer,
            pulse,
            integration,
            extractor,
            write_truth: config.write_truth,
            write_trigger_truth: config.write_trigger_truth,
            channels: FxHashMap::default(),
            channel_order: Vec::new(),
            particles: ParticleTable::default(),
            readout_counter: 0,
            hits_emitted: 0,
        })
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn readout_counter(&self) -> i64 {
        self.readout_counter
    }

    /// Time of the next sample period to be digitized
    pub fn readout_time(&self) -> f64 {
        self.readout_counter as f64 * READOUT_PERIOD
    }

    pub fn hits_emitted(&self) -> u64 {
        self.hits_emitted
    }

    pub fn set_particle_table(&mut self, particles: ParticleTable) {
        self.particles = particles;
    }

    pub fn register_streams(&self, manager: &mut ReadoutDataManager) -> Result<(), DigitizerError> {
        manager.register::<DigitizedHit>(
            &self.names.digitized_hits,
            &self.producer,
            &[self.names.truth_hits.as_str()],
        )?;
        if self.write_trigger_truth {
            manager.register::<TriggerTruthRelation>(
                &self.names.trigger_truth_relations,
                &self.producer,
                &[self.names.truth_hits.as_str()],
            )?;
        }
        Ok(())
    }

    /// Rebuild every channel pipeline for a new detector description
    pub fn detector_changed(
        &mut self,
        geometry: &dyn GeometryProvider,
        conditions: &dyn ConditionsProvider,
    ) -> Result<(), DigitizerError> {
        let ids = geometry.channel_ids()?;
        let mut channels = FxHashMap::default();
        let mut bad = 0;
        for id in ids.iter() {
            let c = conditions.conditions(*id)?;
            if c.bad {
                bad += 1;
            }
            channels.insert(*id, ChannelPipeline::new(*id, c)?);
        }
        self.channels = channels;
        self.channel_order = ids;
        log::info!(
            "{:?} digitizer loaded {} channels ({} bad) from geometry {}",
            self.subsystem,
            self.channel_order.len(),
            bad,
            geometry.name()
        );
        Ok(())
    }

    /// Advance the digitizer to the current simulation time
    pub fn process(&mut self, manager: &mut ReadoutDataManager) -> Result<(), DigitizerError> {
        if self.channels.is_empty() {
            return Err(DigitizerError::NoGeometry);
        }
        let now = manager.current_time();
        let deposits: Vec<SharedDeposit> =
            manager.query(&self.names.truth_hits, now, now + BEAM_BUNCH_SIZE)?;

        let readout_time = self.readout_time();
        for deposit in deposits {
            let pipeline = self
                .channels
                .get_mut(&deposit.channel_id)
                .ok_or(DigitizerError::UnknownChannel(deposit.channel_id))?;
            self.pulse.deposit_to_voltage(
                &deposit,
                &pipeline.conditions,
                readout_time,
                &mut pipeline.voltage,
            )?;
            pipeline.pending.push(deposit);
        }

        let mut records = Vec::new();
        while now - self.readout_time() + BEAM_BUNCH_SIZE >= READOUT_PERIOD {
            self.read_hits(&mut records)?;
        }

        for record in records {
            let hit = record.to_hit();
            let time = Some(record.time());
            manager.append(&self.names.digitized_hits, time, vec![hit])?;
            if self.write_trigger_truth {
                let relations: Vec<TriggerTruthRelation> = record
                    .truth
                    .iter()
                    .map(|truth| TriggerTruthRelation {
                        hit,
                        truth: truth.clone(),
                    })
                    .collect();
                manager.append(&self.names.trigger_truth_relations, time, relations)?;
            }
            self.hits_emitted += 1;
        }
        Ok(())
    }

    /// Digitize one sample period on every channel
    fn read_hits(&mut self, records: &mut Vec<IntegrationRecord>) -> Result<(), DigitizerError> {
        let sample = self.readout_counter;
        for id in self.channel_order.iter() {
            let Some(pipeline) = self.channels.get_mut(id) else {
                continue;
            };
            if let Some(record) = pipeline.read_sample(sample, &self.integration)? {
                log::debug!(
                    "Channel {} integrated {} ADC from sample {}",
                    record.channel_id,
                    record.sum,
                    record.start
                );
                records.push(record);
            }
        }
        self.readout_counter += 1;
        Ok(())
    }

    /// Readout window data for a released trigger
    pub fn on_trigger(
        &self,
        manager: &ReadoutDataManager,
        trigger: &Trigger,
    ) -> Result<Vec<TriggeredCollection>, DigitizerError> {
        let windows = self
            .channel_order
            .iter()
            .filter_map(|id| self.channels.get(id))
            .filter(|p| !p.conditions.bad)
            .map(|p| ChannelWindow {
                channel_id: p.channel_id,
                pedestal: p.pedestal,
                adc: &p.adc,
                truth: &p.truth,
            });
        let readout = self.extractor.extract(
            windows,
            manager.current_time(),
            trigger.time,
            self.readout_counter - 1,
        )?;

        let mut collections = vec![TriggeredCollection::new(
            &self.names.readout_hits,
            readout.hits,
        )];
        if self.write_truth {
            let particles = self.particles.truth_particles(readout.truth_hits.iter());
            collections.push(TriggeredCollection::new(
                &self.names.truth_hits,
                ReadoutData::TruthHits(readout.truth_hits),
            ));
            collections.push(TriggeredCollection::new(
                &self.names.truth_relations,
                ReadoutData::TruthRelations(readout.relations),
            ));
            collections.push(TriggeredCollection::new(
                &self.names.particles,
                ReadoutData::Particles(particles),
            ));
        }
        collections.push(TriggeredCollection::new(
            &self.names.timestamps,
            ReadoutData::Timestamps(vec![ReadoutTimestamp {
                system: self.subsystem.timestamp_flag(),
                time: readout.window_start,
            }]),
        ));
        Ok(collections)
    }
}
