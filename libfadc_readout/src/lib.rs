//! # fadc_readout
//!
//! fadc_readout emulates the flash-ADC readout chain of the HPS electromagnetic
//! calorimeter and hodoscope, written in Rust. It takes simulated energy deposits
//! (truth hits) and trigger times, shapes the deposits into analog pulses, samples and
//! digitizes them every 4 ns, runs the front-end pulse integrator, and on each trigger
//! reads out a window of the digitized pipeline in one of the three FADC output modes.
//!
//! ## Installation
//!
//! The only method of install is from source. Clone the repository and use
//! `cargo install --path ./fadc_readout_cli` from the top level of the repository. To use
//! the CLI see the `fadc_readout_cli` README.
//!
//! ## Simulation Clock
//!
//! The simulation advances in beam bunches of 2 ns. Every stream of data registered with
//! the [`data_manager::ReadoutDataManager`] is stamped with a time and a latency; a stream
//! is only read once the clock has run past its latency. The digitizer samples every
//! channel once per 4 ns readout period, so it catches up every other bunch.
//!
//! Triggers are held by the data manager until every stream has had enough time to
//! produce the data inside the readout window, after which the trigger is released and a
//! [`event_builder::ReadoutEvent`] is assembled.
//!
//! ## Configuration
//!
//! Configurations are YAML files. `fadc_readout_cli new -p config.yml` writes a template
//! with the front-end defaults. The important controls are:
//!
//! - scenario_path: directory holding `run_####.yaml` scenario files (deposits, particles
//! and trigger times)
//! - output_path: directory to which `run_####_readout.yaml` files are written
//! - first_run_number/last_run_number: the run range (inclusive)
//! - n_threads: number of workers the run range is divided amongst
//! - geometry/conditions: the detector channels and their calibrations
//! - add_noise, pe_per_mev, fixed_gain: pulse amplitude and noise model
//! - pulse_shape, pulse_time_parameter: `CRRC`, `DoubleGaussian` or `ThreePole`
//! - integration_threshold, number_samples_before, number_samples_after, dead_time:
//! the pulse integrator
//! - mode, readout_window, readout_offset: triggered readout format (1, 3 or 7) and
//! window, in samples
//! - write_truth, write_trigger_truth: attach truth information to the output
//! - persist_truth_input: write the input deposits around each trigger
//!
//! ## Output
//!
//! Each run produces a YAML stream. The first document is a header with the format
//! version and run number; every following document is one readout event:
//!
//! ```text
//! run_0001_readout.yaml
//! ---
//! version, run_number
//! ---
//! event_number, trigger_time
//! |---- collections
//! |    |---- EcalReadoutHits
//! |    |---- ReadoutTimestamps
//! |    |---- EcalHits (write_truth)
//! |    |---- EcalTruthRelations (write_truth)
//! |    |---- MCParticle (write_truth)
//! ```
pub mod conditions;
pub mod config;
pub mod constants;
pub mod data_manager;
pub mod digitizer;
pub mod error;
pub mod event_builder;
pub mod geometry;
pub mod hits;
pub mod integration;
pub mod latency;
pub mod process;
pub mod pulse;
pub mod ring_buffer;
pub mod scenario;
pub mod trigger_window;
pub mod truth;
pub mod worker_status;
pub mod writer;
