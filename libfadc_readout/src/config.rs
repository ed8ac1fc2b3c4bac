use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::conditions::ConditionsTable;
use super::constants::{
    DEFAULT_DEAD_TIME, DEFAULT_PE_PER_MEV, DEFAULT_PULSE_TIME, DEFAULT_READOUT_OFFSET,
    DEFAULT_READOUT_WINDOW, DEFAULT_SAMPLES_AFTER, DEFAULT_SAMPLES_BEFORE, DEFAULT_THRESHOLD,
    PIPELINE_LENGTH, SYSTEM_ECAL, SYSTEM_HODOSCOPE,
};
use super::error::{ConfigError, IntegrationError};
use super::geometry::ChannelSet;
use super::integration::IntegrationSettings;
use super::pulse::PulseShape;
use super::trigger_window::{ReadoutMode, TriggerWindowExtractor};

/// Detector the digitizer emulates. Selects the readout timestamp flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subsystem {
    #[default]
    Ecal,
    Hodoscope,
}

impl Subsystem {
    pub fn timestamp_flag(&self) -> i32 {
        match self {
            Self::Ecal => SYSTEM_ECAL,
            Self::Hodoscope => SYSTEM_HODOSCOPE,
        }
    }
}

/// Names of the streams and readout collections used by the digitizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNames {
    /// Truth deposits entering the digitizer
    pub truth_hits: String,
    /// Continuously digitized hits sent to the trigger simulation
    pub digitized_hits: String,
    /// Relations between digitized hits and their deposits
    pub trigger_truth_relations: String,
    /// Hits written with each trigger
    pub readout_hits: String,
    /// Relations between triggered hits and re-timed deposits
    pub truth_relations: String,
    pub particles: String,
    pub timestamps: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            truth_hits: String::from("EcalHits"),
            digitized_hits: String::from("EcalRawHits"),
            trigger_truth_relations: String::from("TriggerPathTruthRelations"),
            readout_hits: String::from("EcalReadoutHits"),
            truth_relations: String::from("EcalTruthRelations"),
            particles: String::from("MCParticle"),
            timestamps: String::from("ReadoutTimestamps"),
        }
    }
}

/// Structure representing the application configuration. Contains pathing, run
/// information and the full set of digitizer controls.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scenario_path: PathBuf,
    pub output_path: PathBuf,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub n_threads: i32,
    pub random_seed: u64,

    pub subsystem: Subsystem,
    pub geometry: ChannelSet,
    pub conditions: ConditionsTable,
    pub collections: CollectionNames,

    pub add_noise: bool,
    pub pe_per_mev: f64,
    /// MeV per ADC count applied to every channel instead of the calibration.
    /// Without it the conditions gain is used (0.15 by default), at which a 10 MeV
    /// pulse stays below the default threshold; a gain near 0.02 gives a pulse
    /// whose integral is about 500 ADC.
    pub fixed_gain: Option<f64>,
    pub pulse_shape: PulseShape,
    /// ns
    pub pulse_time_parameter: f64,

    pub integration_threshold: i32,
    pub number_samples_before: usize,
    pub number_samples_after: usize,
    pub dead_time: usize,

    pub mode: u8,
    pub write_truth: bool,
    pub write_trigger_truth: bool,
    /// Write the input deposits around each trigger, untouched
    #[serde(default)]
    pub persist_truth_input: bool,
    /// samples
    pub readout_window: usize,
    /// samples
    pub readout_offset: i64,

    /// ns, default span of persisted streams
    pub persistent_window: f64,
    /// ns before the trigger where persisted streams start
    pub persistent_offset: f64,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid, digitizer settings
    /// match the front-end defaults.
    fn default() -> Self {
        Self {
            scenario_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            first_run_number: 0,
            last_run_number: 0,
            n_threads: 1,
            random_seed: 0,
            subsystem: Subsystem::default(),
            geometry: ChannelSet::default(),
            conditions: ConditionsTable::default(),
            collections: CollectionNames::default(),
            add_noise: true,
            pe_per_mev: DEFAULT_PE_PER_MEV,
            fixed_gain: None,
            pulse_shape: PulseShape::ThreePole,
            pulse_time_parameter: DEFAULT_PULSE_TIME,
            integration_threshold: DEFAULT_THRESHOLD,
            number_samples_before: DEFAULT_SAMPLES_BEFORE,
            number_samples_after: DEFAULT_SAMPLES_AFTER,
            dead_time: DEFAULT_DEAD_TIME,
            mode: 1,
            write_truth: false,
            write_trigger_truth: false,
            persist_truth_input: false,
            readout_window: DEFAULT_READOUT_WINDOW,
            readout_offset: DEFAULT_READOUT_OFFSET,
            persistent_window: 200.0,
            persistent_offset: 50.0,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check everything that can be checked before a run starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("truth_hits", &self.collections.truth_hits),
            ("digitized_hits", &self.collections.digitized_hits),
            ("readout_hits", &self.collections.readout_hits),
            ("timestamps", &self.collections.timestamps),
        ];
        for (field, name) in names {
            if name.is_empty() {
                return Err(ConfigError::MissingCollectionName(field));
            }
        }
        if self.write_trigger_truth && self.collections.trigger_truth_relations.is_empty() {
            return Err(ConfigError::MissingCollectionName("trigger_truth_relations"));
        }
        if self.write_truth {
            if self.collections.truth_relations.is_empty() {
                return Err(ConfigError::MissingCollectionName("truth_relations"));
            }
            if self.collections.particles.is_empty() {
                return Err(ConfigError::MissingCollectionName("particles"));
            }
        }

        if self.write_truth && self.persist_truth_input {
            return Err(ConfigError::InvalidValue {
                field: "persist_truth_input",
                reason: format!(
                    "collection {} can not hold both input and re-timed deposits",
                    self.collections.truth_hits
                ),
            });
        }

        self.readout_mode()?;

        if let Some(gain) = self.fixed_gain {
            if gain <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "fixed_gain",
                    reason: format!("{gain} must be positive"),
                });
            }
        }
        if self.readout_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "readout_window",
                reason: String::from("window must contain at least one sample"),
            });
        }
        if self.readout_window + self.readout_offset.max(0) as usize >= PIPELINE_LENGTH {
            return Err(ConfigError::InvalidValue {
                field: "readout_window",
                reason: format!(
                    "window of {} samples with offset {} does not fit the {PIPELINE_LENGTH} sample pipeline",
                    self.readout_window, self.readout_offset
                ),
            });
        }
        if self.readout_offset < 0 {
            return Err(ConfigError::InvalidValue {
                field: "readout_offset",
                reason: String::from("offset can not be negative"),
            });
        }
        if !self.is_n_threads_valid() {
            return Err(ConfigError::InvalidValue {
                field: "n_threads",
                reason: String::from("at least one thread is required"),
            });
        }
        Ok(())
    }

    pub fn readout_mode(&self) -> Result<ReadoutMode, ConfigError> {
        ReadoutMode::try_from(self.mode)
    }

    pub fn pe_per_mev(&self) -> Option<f64> {
        if self.add_noise {
            Some(self.pe_per_mev)
        } else {
            None
        }
    }

    pub fn integration_settings(&self) -> Result<IntegrationSettings, IntegrationError> {
        IntegrationSettings::builder()
            .threshold(self.integration_threshold)
            .samples_before(self.number_samples_before)
            .samples_after(self.number_samples_after)
            .dead_time(self.dead_time)
            .keep_truth(self.write_trigger_truth)
            .build()
    }

    pub fn trigger_window(&self) -> Result<TriggerWindowExtractor, ConfigError> {
        Ok(TriggerWindowExtractor {
            mode: self.readout_mode()?,
            window: self.readout_window,
            offset: self.readout_offset,
            threshold: self.integration_threshold,
            samples_before: self.number_samples_before,
            samples_after: self.number_samples_after,
            write_truth: self.write_truth,
        })
    }

    /// Seed for a run so that runs are independent but reproducible
    pub fn run_seed(&self, run_number: i32) -> u64 {
        self.random_seed.wrapping_add(run_number as u64)
    }

    /// Check if a specific run exists by evaluating the existance of its scenario file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_scenario_file(run_number).exists()
    }

    pub fn get_scenario_file(&self, run_number: i32) -> PathBuf {
        self.scenario_path
            .join(format!("{}.yaml", self.get_run_str(run_number)))
    }

    /// Get the path to the output readout file
    pub fn get_output_file_name(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let output_file_path: PathBuf = self
            .output_path
            .join(format!("{}_readout.yaml", self.get_run_str(run_number)));
        if self.output_path.exists() {
            Ok(output_file_path)
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    fn get_run_str(&self, run_number: i32) -> String {
        format!("run_{run_number:0>4}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_round_trip() {
        let mut config = Config::default();
        config.mode = 7;
        config.fixed_gain = Some(0.02);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let read = Config::read_config_file(file.path()).unwrap();
        assert_eq!(read.mode, 7);
        assert_eq!(read.fixed_gain, Some(0.02));
        assert_eq!(read.pulse_shape, PulseShape::ThreePole);
        assert_eq!(read.collections, CollectionNames::default());
        assert!(read.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::read_config_file(Path::new("/definitely/not/here.yaml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.mode = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedMode(2))
        ));

        let mut config = Config::default();
        config.collections.readout_hits = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCollectionName("readout_hits"))
        ));

        let mut config = Config::default();
        config.fixed_gain = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.readout_window = PIPELINE_LENGTH;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.write_truth = true;
        config.persist_truth_input = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "persist_truth_input",
                ..
            })
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let settings = config.integration_settings().unwrap();
        assert_eq!(settings.threshold, 18);
        assert_eq!(settings.samples_before, 5);
        assert_eq!(settings.samples_after, 25);
        assert_eq!(settings.dead_time, 8);
        assert_eq!(config.readout_mode().unwrap(), ReadoutMode::Mode1);
        assert_eq!(config.subsystem.timestamp_flag(), SYSTEM_ECAL);
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            scenario_path: dir.path().to_path_buf(),
            output_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(
            config.get_scenario_file(12),
            dir.path().join("run_0012.yaml")
        );
        assert!(!config.does_run_exist(12));
        assert_eq!(
            config.get_output_file_name(3).unwrap(),
            dir.path().join("run_0003_readout.yaml")
        );
    }
}
