use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RingBufferError {
    #[error("RingBuffer must have a capacity of at least one slot")]
    ZeroCapacity,
    #[error("RingBuffer offset {offset} is out of range for a buffer of capacity {capacity}")]
    OffsetOutOfRange { offset: i64, capacity: usize },
}

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Found invalid pulse shape keyword: {0}")]
    UnknownShape(String),
    #[error("Pulse time parameter must be positive, found {0} ns")]
    BadShapingTime(f64),
    #[error("Photoelectrons per MeV must be positive when noise is enabled, found {0}")]
    BadPhotoelectrons(f64),
    #[error("Gain must be positive, found {gain} MeV/ADC on channel {channel_id}")]
    BadGain { channel_id: u64, gain: f64 },
    #[error("Deposit on channel {channel_id} at {time} ns precedes the analog pipeline write horizon at {horizon} ns")]
    Causality {
        channel_id: u64,
        time: f64,
        horizon: f64,
    },
    #[error("PulseModel failed to build the noise distribution: {0}")]
    Noise(#[from] rand_distr::NormalError),
    #[error("PulseModel failed due to RingBuffer error: {0}")]
    Buffer(#[from] RingBufferError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LatencyError {
    #[error("Stream dependency cycle detected among: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

#[derive(Debug, Error)]
pub enum DataManagerError {
    #[error("Stream name must be defined")]
    MissingName,
    #[error("Stream \"{name}\" of type {type_name} already exists")]
    DuplicateStream { name: String, type_name: &'static str },
    #[error("Stream \"{0}\" has not been registered")]
    UnknownStream(String),
    #[error("Stream \"{name}\" holds {expected} but {found} was requested")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Stream \"{0}\" depends on a stream that was never registered, so its latency is unknown")]
    UnresolvedLatency(String),
    #[error("Stream \"{name}\" of type {type_name} can not be persisted")]
    NotPersistable { name: String, type_name: &'static str },
    #[error("Trigger time {0} ns is not a finite simulation time")]
    BadTriggerTime(f64),
    #[error("ReadoutDataManager failed due to latency error: {0}")]
    Latency(#[from] LatencyError),
}

#[derive(Debug, Error)]
pub enum ConditionsError {
    #[error("No conditions are defined for channel {0}")]
    MissingChannel(u64),
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Geometry \"{0}\" does not define any channels")]
    NoChannels(String),
    #[error("Geometry \"{name}\" has an inverted channel range {first}..={last}")]
    BadRange { name: String, first: u64, last: u64 },
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Number of samples after the threshold crossing must be at least 1")]
    NoSamplesAfter,
    #[error("Dead time must be at least 1 sample")]
    NoDeadTime,
    #[error("Integration window of {before} samples before the crossing does not fit a pipeline of {pipeline} samples")]
    WindowTooLong { before: usize, pipeline: usize },
    #[error("ChannelIntegrator failed due to RingBuffer error: {0}")]
    Buffer(#[from] RingBufferError),
}

#[derive(Debug, Error)]
pub enum TriggerWindowError {
    #[error("Readout window of {window} samples at latency {latency} does not fit a pipeline of {pipeline} samples")]
    WindowOutsidePipeline {
        window: usize,
        latency: i64,
        pipeline: usize,
    },
    #[error("Channel {channel_id} produced readout hits in a format other than the readout mode")]
    MixedFormats { channel_id: u64 },
    #[error("TriggerWindowExtractor failed due to RingBuffer error: {0}")]
    Buffer(#[from] RingBufferError),
}

#[derive(Debug, Error)]
pub enum DigitizerError {
    #[error("Received a deposit on channel {0} which is not part of the geometry")]
    UnknownChannel(u64),
    #[error("Digitizer was asked to run before any geometry was loaded")]
    NoGeometry,
    #[error("Digitizer failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Digitizer failed due to conditions error: {0}")]
    ConditionsError(#[from] ConditionsError),
    #[error("Digitizer failed due to geometry error: {0}")]
    GeometryError(#[from] GeometryError),
    #[error("Digitizer failed due to pulse error: {0}")]
    PulseError(#[from] PulseError),
    #[error("Digitizer failed due to integration error: {0}")]
    IntegrationError(#[from] IntegrationError),
    #[error("Digitizer failed due to trigger window error: {0}")]
    TriggerWindowError(#[from] TriggerWindowError),
    #[error("Digitizer failed due to ReadoutDataManager error: {0}")]
    DataManagerError(#[from] DataManagerError),
    #[error("Digitizer failed due to RingBuffer error: {0}")]
    Buffer(#[from] RingBufferError),
}

#[derive(Debug, Error)]
pub enum EventBuilderError {
    #[error("EventBuilder failed due to a trigger that was out of order -- trigger time: {0} last built trigger time: {1}")]
    TriggerOutOfOrder(f64, f64),
    #[error("EventBuilder found multiple collections named \"{0}\" with differing definitions")]
    ConflictingCollection(String),
    #[error("EventBuilder was given a collection before any trigger was started")]
    NoActiveEvent,
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("ReadoutWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ReadoutWriter failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("ReadoutWriter was already closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config is missing the collection name for {0}")]
    MissingCollectionName(&'static str),
    #[error("Error: Mode {0} is not a supported output mode")]
    UnsupportedMode(u8),
    #[error("Config has an invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to load scenario as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Scenario failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Scenario failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Scenario contains a deposit at negative time {0} ns")]
    NegativeTime(f64),
    #[error("Scenario contains a non-finite time")]
    NonFiniteTime,
    #[error("Scenario failed due to ReadoutDataManager error: {0}")]
    DataManagerError(#[from] DataManagerError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Scenario error: {0}")]
    ScenarioError(#[from] ScenarioError),
    #[error("Processor failed due to Digitizer error: {0}")]
    DigitizerError(#[from] DigitizerError),
    #[error("Processor failed due to ReadoutDataManager error: {0}")]
    DataManagerError(#[from] DataManagerError),
    #[error("Processor failed due to EventBuilder error: {0}")]
    EVBError(#[from] EventBuilderError),
    #[error("Processor failed due to ReadoutWriter error: {0}")]
    WriterError(#[from] WriterError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
