use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use super::constants::BEAM_BUNCH_SIZE;
use super::data_manager::{Producer, ReadoutDataManager};
use super::error::ScenarioError;
use super::truth::{McParticle, ParticleTable, SharedDeposit, TruthDeposit};

/// Simulated input of one run: the particle tree, the deposits it left in the
/// detector and the times at which the trigger fired.
/// Scenarios are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub particles: Vec<McParticle>,
    #[serde(default)]
    pub deposits: Vec<TruthDeposit>,
    #[serde(default)]
    pub triggers: Vec<f64>,
}

impl Scenario {
    /// Read a scenario from a YAML file
    pub fn read_scenario_file(path: &Path) -> Result<Self, ScenarioError> {
        if !path.exists() {
            return Err(ScenarioError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        for deposit in self.deposits.iter() {
            if !deposit.time.is_finite() || !deposit.energy.is_finite() {
                return Err(ScenarioError::NonFiniteTime);
            }
            if deposit.time < 0.0 {
                return Err(ScenarioError::NegativeTime(deposit.time));
            }
        }
        if self.triggers.iter().any(|t| !t.is_finite()) {
            return Err(ScenarioError::NonFiniteTime);
        }
        Ok(())
    }

    /// Time of the last deposit or trigger
    pub fn end_time(&self) -> f64 {
        self.deposits
            .iter()
            .map(|d| d.time)
            .chain(self.triggers.iter().copied())
            .fold(0.0, f64::max)
    }
}

/// Feeds a scenario into the readout data manager one beam bunch at a time,
/// acting as both the truth source and the trigger source of a run.
#[derive(Debug)]
pub struct ScenarioSource {
    stream: String,
    producer: Producer,
    deposits: VecDeque<SharedDeposit>,
    triggers: VecDeque<f64>,
    end_time: f64,
}

impl ScenarioSource {
    /// Returns the source and the particle table of the scenario
    pub fn new(scenario: Scenario, stream: &str) -> Result<(Self, ParticleTable), ScenarioError> {
        scenario.validate()?;
        let end_time = scenario.end_time();
        let Scenario {
            particles,
            mut deposits,
            mut triggers,
        } = scenario;
        deposits.sort_by(|a, b| a.time.total_cmp(&b.time));
        triggers.sort_by(|a, b| a.total_cmp(b));
        log::info!(
            "Scenario has {} deposits, {} particles and {} triggers",
            deposits.len(),
            particles.len(),
            triggers.len()
        );
        Ok((
            Self {
                stream: stream.to_string(),
                producer: Producer::new("ScenarioSource", 0.0),
                deposits: deposits.into_iter().map(Arc::new).collect(),
                triggers: triggers.into(),
                end_time,
            },
            ParticleTable::new(particles),
        ))
    }

    /// Register the truth stream. A persistent stream is also written out
    /// around every trigger.
    pub fn register(
        &self,
        manager: &mut ReadoutDataManager,
        persistent: bool,
    ) -> Result<(), ScenarioError> {
        if persistent {
            manager.register_persistent::<SharedDeposit>(&self.stream, &self.producer, &[], None)?;
        } else {
            manager.register::<SharedDeposit>(&self.stream, &self.producer, &[])?;
        }
        Ok(())
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn is_exhausted(&self) -> bool {
        self.deposits.is_empty() && self.triggers.is_empty()
    }

    /// Hand over the deposits of the current beam bunch and any trigger that has fired
    pub fn step(&mut self, manager: &mut ReadoutDataManager) -> Result<(), ScenarioError> {
        let now = manager.current_time();
        let mut batch = Vec::new();
        while let Some(deposit) = self.deposits.front() {
            if deposit.time >= now + BEAM_BUNCH_SIZE {
                break;
            }
            if let Some(deposit) = self.deposits.pop_front() {
                batch.push(deposit);
            }
        }
        manager.append(&self.stream, Some(now), batch)?;

        while let Some(time) = self.triggers.front().copied() {
            if time > now {
                break;
            }
            self.triggers.pop_front();
            manager.send_trigger(time)?;
        }
        Ok(())
    }
}
