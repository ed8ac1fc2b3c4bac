use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use libfadc_readout::config::Config;
use libfadc_readout::process::{create_subsets, process_subset};
use libfadc_readout::worker_status::WorkerStatus;

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn main() {
    // Create a cli
    let matches = Command::new("fadc_readout_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if let Err(e) = config.validate() {
        log::error!("{e}");
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("Scenario Path: {}", config.scenario_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );
    log::info!(
        "Subsystem: {:?} Geometry: {} Mode: {}",
        config.subsystem,
        config.geometry.name,
        config.mode
    );
    log::info!("Number of Workers: {}", config.n_threads);

    // Spawn the workers, one progress bar each
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let style = ProgressStyle::with_template("Worker {prefix} [{bar:40}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let mut bars: Vec<ProgressBar> = Vec::new();
    let mut workers = Vec::new();
    for subset in create_subsets(&config) {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let idx = workers.len();
        let pb = pb_manager.add(ProgressBar::new(100));
        pb.set_style(style.clone());
        pb.set_prefix(format!("{idx}"));
        bars.push(pb);

        let conf = config.clone();
        let worker_tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, worker_tx, idx, subset)
        }));
    }
    // Only the workers hold senders now
    drop(tx);

    // Blocks until every worker has hung up
    for status in rx.iter() {
        if let Some(pb) = bars.get(status.worker_id) {
            pb.set_message(format!("Run {}", status.run_number));
            pb.set_position((status.progress * 100.0) as u64);
        }
    }

    for (idx, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(result) => match result {
                Ok(_) => log::info!("Worker {idx} successfully processed its runs!"),
                Err(e) => log::error!("Worker {idx} failed with error: {e}"),
            },
            Err(_) => log::error!("Failed to join worker {idx}!"),
        }
    }

    for pb in bars.iter() {
        pb.finish();
    }

    log::info!("Done.");
}
