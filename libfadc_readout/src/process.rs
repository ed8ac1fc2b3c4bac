use std::sync::mpsc::Sender;

use super::config::Config;
use super::constants::BEAM_BUNCH_SIZE;
use super::data_manager::ReadoutDataManager;
use super::digitizer::Digitizer;
use super::error::ProcessorError;
use super::event_builder::EventBuilder;
use super::hits::TriggeredCollection;
use super::scenario::{Scenario, ScenarioSource};
use super::worker_status::WorkerStatus;
use super::writer::{ReadoutWriter, YamlWriter};

/// Totals of a processed run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub events_written: u64,
    pub digitized_hits: u64,
    pub final_time: f64,
}

/// The final event of the EventBuilder will need a manual flush
fn flush_final_event<W: ReadoutWriter>(
    evb: &mut EventBuilder,
    writer: &mut W,
    event_counter: &mut u64,
) -> Result<(), ProcessorError> {
    if let Some(event) = evb.flush_final_event() {
        writer.write_event(&event)?;
        *event_counter += 1;
    }
    writer.close()?;
    Ok(())
}

/// The main loop of the readout simulation.
///
/// Steps the clock one beam bunch at a time: the scenario hands over its deposits
/// and triggers, the digitizer catches up to the clock, and every trigger whose
/// data is complete is assembled into a ReadoutEvent and written. Runs until the
/// scenario is exhausted and every trigger has been read out. `report` is called
/// with the fraction of the run completed.
pub fn process_scenario<W, F>(
    config: &Config,
    scenario: Scenario,
    seed: u64,
    writer: &mut W,
    mut report: F,
) -> Result<RunSummary, ProcessorError>
where
    W: ReadoutWriter,
    F: FnMut(f32) -> Result<(), ProcessorError>,
{
    config.validate()?;
    let mut manager = ReadoutDataManager::new(config.persistent_window, config.persistent_offset);
    let (mut source, particles) = ScenarioSource::new(scenario, &config.collections.truth_hits)?;
    source.register(&mut manager, config.persist_truth_input)?;

    let mut digitizer = Digitizer::new(config, seed)?;
    digitizer.set_particle_table(particles);
    digitizer.register_streams(&mut manager)?;
    digitizer.detector_changed(&config.geometry, &config.conditions)?;

    let trigger_delay = manager.start_of_data()?;
    let expected_end = source.end_time() + trigger_delay + BEAM_BUNCH_SIZE;

    let flush_frac: f32 = 0.01;
    let mut progress: f32 = 0.0;
    let mut evb = EventBuilder::new();
    let mut event_counter: u64 = 0;
    report(0.0)?;
    loop {
        source.step(&mut manager)?;
        digitizer.process(&mut manager)?;

        while let Some(trigger) = manager.pop_ready_trigger() {
            log::debug!("Reading out trigger at {} ns", trigger.time);
            if let Some(event) = evb.start_event(&trigger)? {
                writer.write_event(&event)?;
                event_counter += 1;
            }
            for collection in manager.persistent_readout(&trigger) {
                evb.append_collection(collection)?;
            }
            evb.append_collection(TriggeredCollection::new(
                &config.collections.timestamps,
                manager.trigger_timestamps(&trigger),
            ))?;
            for collection in digitizer.on_trigger(&manager, &trigger)? {
                evb.append_collection(collection)?;
            }
        }

        let fraction = (manager.current_time() / expected_end) as f32;
        if fraction - progress > flush_frac {
            progress = fraction.min(1.0);
            report(progress)?;
        }

        if source.is_exhausted() && manager.pending_triggers() == 0 {
            break;
        }
        manager.advance();
    }
    flush_final_event(&mut evb, writer, &mut event_counter)?;
    report(1.0)?;

    Ok(RunSummary {
        events_written: event_counter,
        digitized_hits: digitizer.hits_emitted(),
        final_time: manager.current_time(),
    })
}

/// Process a single run, reading its scenario and writing its readout file
pub fn process_run(
    config: &Config,
    run_number: i32,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<RunSummary, ProcessorError> {
    let scenario = Scenario::read_scenario_file(&config.get_scenario_file(run_number))?;
    let output_path = config.get_output_file_name(run_number)?;
    let mut writer = YamlWriter::new(&output_path, run_number)?;

    let summary = process_scenario(
        config,
        scenario,
        config.run_seed(run_number),
        &mut writer,
        |progress| {
            tx.send(WorkerStatus::new(progress, run_number, *worker_id))?;
            Ok(())
        },
    )?;
    log::info!(
        "Run {} produced {} digitized hits and {} readout events",
        run_number,
        summary.digitized_hits,
        summary.events_written
    );
    Ok(summary)
}

/// The function to be called by a separate thread (typically the UI).
/// Allows multiple runs to be processed
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let runs: Vec<i32> = (config.first_run_number..(config.last_run_number + 1)).collect();
    process_subset(config, tx, worker_id, runs)
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(), ProcessorError> {
    for run in subset {
        if config.does_run_exist(run) {
            log::info!("Processing run {}...", run);
            process_run(&config, run, &tx, &worker_id)?;
            log::info!("Finished processing run {}.", run);
        } else {
            log::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}
