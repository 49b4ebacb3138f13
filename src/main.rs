use std::io::{self, Write};
use std::process;

use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info};

use turbosort::cli::{Cli, Commands};
use turbosort::{config, logging, report, AppConfig, Engine, Ledger, Signal};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Run) | None => run_engine(config),
        Some(Commands::History(history_args)) => {
            let ledger = Ledger::load(&config.history_file);
            report::display_history(&ledger, history_args.detailed);
        }
        Some(Commands::Stats) => {
            let ledger = Ledger::load(&config.history_file);
            report::print_stats(&ledger);
        }
        Some(Commands::ClearHistory) => {
            match prompt_confirm(
                "Are you SURE you want to clear the copy history?",
                Some(false),
            ) {
                Ok(true) => {
                    let mut ledger = Ledger::load(&config.history_file);
                    match ledger.clear() {
                        Ok(()) => info!("Copy history cleared"),
                        Err(err) => error!("Error clearing history: {}", err),
                    }
                }
                _ => process::exit(0),
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config.redacted());
        }
    }
}

fn run_engine(config: AppConfig) {
    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            error!("Error starting engine: {}", err);
            process::exit(1);
        }
    };

    let tx = engine.sender();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = tx.send(Signal::Shutdown);
    }) {
        error!("Error installing ctrl-c handler: {}", err);
        process::exit(1);
    }

    info!("TurboSort running. Press Ctrl+C to stop.");
    if let Err(err) = engine.run() {
        error!("Error: {}", err);
        process::exit(1);
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
