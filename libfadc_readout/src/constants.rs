// Clock
/// Duration of one FADC sample in ns
pub const READOUT_PERIOD: f64 = 4.0;
/// Simulation clock quantum (one beam bunch) in ns
pub const BEAM_BUNCH_SIZE: f64 = 2.0;
/// Fine-time subdivisions per sample used in integrated hit timestamps
pub const TIME_SUBSAMPLES: i64 = 64;

// Digitizer
pub const ADC_BITS: u32 = 12;
/// Full-scale input voltage of the digitizer
pub const MAX_VOLTAGE: f64 = 2.0;
/// ADC counts per volt: (2^12 - 1) / V_max
pub const ADC_SCALE: f64 = ((1_u32 << ADC_BITS) - 1) as f64 / MAX_VOLTAGE;
/// Saturated ADC code
pub const ADC_OVERFLOW: i32 = 1 << ADC_BITS;

// Pipelines
pub const VOLTAGE_BUFFER_LENGTH: usize = 100;
pub const PIPELINE_LENGTH: usize = 2000;

// Double gaussian pulse widths (ns)
pub const DOUBLE_GAUSSIAN_RISE: f64 = 0.5;
pub const DOUBLE_GAUSSIAN_FALL: f64 = 50.0;

// Readout data manager
/// Minimum time (ns) stream batches are retained behind the clock
pub const DATA_RETENTION: f64 = 500.0;
/// Extra wait (ns) applied to every trigger before it is read out
pub const TRIGGER_SAFETY_MARGIN: f64 = 150.0;

// Readout timestamp system flags
pub const SYSTEM_TRIGGER_BITS: i32 = 0;
pub const SYSTEM_ECAL: i32 = 2;
pub const SYSTEM_TRIGGER_TIME: i32 = 3;
pub const SYSTEM_HODOSCOPE: i32 = 4;

// Driver defaults
pub const DEFAULT_THRESHOLD: i32 = 18;
pub const DEFAULT_SAMPLES_BEFORE: usize = 5;
pub const DEFAULT_SAMPLES_AFTER: usize = 25;
pub const DEFAULT_DEAD_TIME: usize = 8;
pub const DEFAULT_READOUT_WINDOW: usize = 100;
pub const DEFAULT_READOUT_OFFSET: i64 = 36;
pub const DEFAULT_PE_PER_MEV: f64 = 32.8;
pub const DEFAULT_PULSE_TIME: f64 = 9.6;
