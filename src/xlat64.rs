//! Entrypoint for the `xlat64` binary.
//!
//! The packet I/O of a real deployment is out of scope here. Instead, `replay` pushes
//! hex-encoded packets through a translator instance, and `pool` dumps its pools.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    sync::Arc,
    time::Duration,
};

use args::xlat64::{Args, Command};
use clap::Parser;
use common::{logging::enable_logger, profiler::start_puffin_server, replay};
use xlat64::{
    admin::{handle_pool_request, PoolRequest, PoolResponse},
    send::QueueSender,
    xlat::HeaderTranslator,
    Xlator,
};

mod args;
mod common;

pub fn main() {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    if let Err(error) = enable_logger(args.verbose) {
        eprintln!("Failed to set up logging: {error}");
        std::process::exit(1);
    }

    // Load the config
    let config = match args.data() {
        Ok(config) => config,
        Err(error) => {
            log::error!("Invalid configuration: {}", error);
            std::process::exit(1);
        }
    };

    // Start the profiler if requested
    let _server = start_puffin_server(&args.profiler_args);

    match args.command {
        Command::Replay {
            ref input,
            workers,
            sweep_interval,
            print_metrics,
        } => {
            let x = match Xlator::new(
                config,
                Arc::new(HeaderTranslator),
                Arc::new(replay::HexSender),
            ) {
                Ok(x) => x,
                Err(error) => {
                    log::error!("Failed to set up the translator: {}", error);
                    std::process::exit(1);
                }
            };

            let reader: Box<dyn BufRead + Send> = match input {
                Some(path) => match File::open(path) {
                    Ok(file) => Box::new(BufReader::new(file)),
                    Err(error) => {
                        log::error!("Could not open {}: {}", path.display(), error);
                        std::process::exit(1);
                    }
                },
                None => Box::new(BufReader::new(std::io::stdin())),
            };

            let stats = replay::replay(&x, reader, workers, Duration::from_secs(sweep_interval));
            let swept = x.sweep();
            log::info!(
                "Translated {}, accepted {}, dropped {} packets ({} malformed lines)",
                stats.translated,
                stats.accepted,
                stats.dropped,
                stats.malformed
            );
            log::info!(
                "{} sessions and {} bindings left after sweeping {} and {}",
                x.sessions().len(),
                x.bindings().len(),
                swept.sessions,
                swept.bindings
            );

            if print_metrics {
                #[cfg(feature = "metrics")]
                print!("{}", xlat64_metrics::render());
                #[cfg(not(feature = "metrics"))]
                log::warn!("Built without metrics support");
            }
        }
        Command::Pool { kind, protocol } => {
            let x = match Xlator::new(
                config,
                Arc::new(HeaderTranslator),
                Arc::new(QueueSender::default()),
            ) {
                Ok(x) => x,
                Err(error) => {
                    log::error!("Failed to set up the translator: {}", error);
                    std::process::exit(1);
                }
            };

            // Walk the pool one page at a time, the same way an administrative client would
            let kind = kind.kind(protocol);
            let mut offset = None;
            loop {
                let page = match handle_pool_request(&x, kind, PoolRequest::Foreach { offset }) {
                    Ok(page) => page,
                    Err(error) => {
                        log::error!("{}", error);
                        std::process::exit(1);
                    }
                };
                match serde_json::to_string(&page) {
                    Ok(json) => println!("{json}"),
                    Err(error) => log::error!("Failed to serialize {:?}: {}", page, error),
                }
                match page {
                    PoolResponse::Prefixes {
                        entries,
                        pending: true,
                    } => offset = entries.last().copied(),
                    _ => break,
                }
            }
        }
    }
}
