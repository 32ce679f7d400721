//! Fusiontest - two-burst auditory fusion test
//!
//! Terminal front end: plays trials on key commands and logs responses.

use anyhow::Result;
use fusiontest::audio::cpal_backend::{CpalHost, RodioSink};
use fusiontest::audio::engine::{EngineOptions, PcmSink, PlaybackEngine};
use fusiontest::session::config::SessionConfig;
use fusiontest::session::controller::{PlaybackRequest, SessionController};
use fusiontest::session::log::{ListenerResponse, DEFAULT_EXPORT_FILE};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

type Session = SessionController<CpalHost, StdRng>;

struct Options {
    config_path: Option<PathBuf>,
    log_path: PathBuf,
    fallback: bool,
    require_unlock: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fusiontest=info".parse()?),
        )
        .init();

    println!("Fusiontest v{} ({})", fusiontest::VERSION, fusiontest::BUILD_DATE);
    println!();

    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        config_path: None,
        log_path: PathBuf::from(DEFAULT_EXPORT_FILE),
        fallback: false,
        require_unlock: false,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--list" | "-l" => {
                list_devices()?;
                return Ok(());
            }
            "--version" | "-v" => {
                println!("fusiontest {}", fusiontest::VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a path");
                    return Ok(());
                }
                options.config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--log" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --log requires a path");
                    return Ok(());
                }
                options.log_path = PathBuf::from(&args[i + 1]);
                i += 2;
                continue;
            }
            "--fallback" => options.fallback = true,
            "--unlock" => options.require_unlock = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let config = match &options.config_path {
        Some(path) => match SessionConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {}", e);
                println!("Error: {}", e);
                return Ok(());
            }
        },
        None => SessionConfig::load(),
    };

    run_session(config, &options)
}

fn print_help() {
    println!("Usage: fusiontest [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH   Load session configuration from PATH");
    println!("  -l, --list          List output devices");
    println!("      --fallback      Enable the PCM fallback player");
    println!("      --unlock        Use low-latency output only after 'u'");
    println!("      --log PATH      CSV export path (default: {})", DEFAULT_EXPORT_FILE);
    println!("  -v, --version       Show version");
    println!("  -h, --help          Show this help");
}

fn print_commands() {
    println!("Commands:");
    println!("  1      play one-burst decoy");
    println!("  2      play two-burst");
    println!("  r      play random (blinded)");
    println!("  a N    log response N (1 or 2) for the current trial");
    println!("  u      unlock low-latency output");
    println!("  c      clear the response log");
    println!("  e      export the response log");
    println!("  s      show stimulus summary");
    println!("  q      quit");
}

fn list_devices() -> Result<()> {
    println!("Scanning for output devices...");
    println!();

    match CpalHost::list_output_devices() {
        Ok(devices) if devices.is_empty() => println!("No output devices found."),
        Ok(devices) => {
            println!("Found {} device(s):", devices.len());
            println!();
            for (i, device) in devices.iter().enumerate() {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}. {}{}", i + 1, device.name, default_marker);
                println!("     Channels: {} out", device.output_channels);
                if let Some(rate) = device.sample_rate {
                    println!("     Sample rate: {} Hz", rate);
                }
                println!();
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }

    Ok(())
}

fn run_session(config: SessionConfig, options: &Options) -> Result<()> {
    let engine_options = EngineOptions {
        require_unlock: options.require_unlock,
        ..EngineOptions::default()
    };

    let fallback: Option<Box<dyn PcmSink>> = if options.fallback || options.require_unlock {
        match RodioSink::try_default() {
            Ok(sink) => Some(Box::new(sink)),
            Err(e) => {
                warn!("Fallback player unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let engine = PlaybackEngine::new(CpalHost::new(), fallback, engine_options);
    let mut session: Session = SessionController::new(config, engine, StdRng::from_os_rng());

    println!("{}", session.session_config().summary());
    println!();
    print_commands();
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while running.load(Ordering::SeqCst) {
        print!("trial {}> ", session.log().next_trial());
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("1") => play(&mut session, PlaybackRequest::Decoy),
            Some("2") => play(&mut session, PlaybackRequest::TwoBurst),
            Some("r") => play(&mut session, PlaybackRequest::Random),
            Some("a") => {
                let response = parts
                    .next()
                    .and_then(|n| n.parse::<u8>().ok())
                    .and_then(ListenerResponse::from_count);
                match response {
                    Some(response) => {
                        let record = session.on_response(response, None);
                        println!("Logged trial {}: {}", record.trial, response.count());
                    }
                    None => println!("Response must be 1 or 2"),
                }
            }
            Some("u") => match session.unlock() {
                Ok(()) => println!("Low-latency output unlocked"),
                Err(e) => println!("Unlock failed: {}", e),
            },
            Some("c") => {
                session.clear_log();
                println!("Log cleared");
            }
            Some("e") => export(&session, &options.log_path),
            Some("s") => println!("{}", session.session_config().summary()),
            Some("q") => break,
            Some(other) => {
                println!("Unknown command: {}", other);
                print_commands();
            }
            None => {}
        }
    }

    if !session.log().is_empty() {
        export(&session, &options.log_path);
    }

    info!("Session ended");
    println!("Done.");
    Ok(())
}

fn play(session: &mut Session, request: PlaybackRequest) {
    match session.request_playback(request) {
        Ok(outcome) => {
            // Blinded trials don't reveal the variant
            if request == PlaybackRequest::Random {
                println!("Played random trial");
            } else {
                println!("Played {}", outcome.variant);
            }
        }
        Err(e) if e.is_retryable() => println!("No sound: {} (try again)", e),
        Err(e) => println!("No sound: {}", e),
    }
}

fn export(session: &Session, path: &Path) {
    match session.log().export_csv(path) {
        Ok(()) => println!(
            "Exported {} response(s) to {}",
            session.log().len(),
            path.display()
        ),
        Err(e) => {
            error!("Failed to export log: {}", e);
            println!("Error: {}", e);
        }
    }
}
