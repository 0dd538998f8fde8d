//! # wshuffle
//!
//! Reinforcement-weighted song scheduling for cmus. Register the binary as
//! cmus' `status_display_program` and bind keys to `wshuffle score 1`,
//! `wshuffle score -1` and `wshuffle previous`.
//!
//! ## Usage
//!
//! ```bash
//! # React to the current player state (what the cmus hook runs)
//! wshuffle react
//!
//! # Like / dislike the current track
//! wshuffle score 1
//! wshuffle score -1
//!
//! # Serialize everything through one long-lived process
//! wshuffle daemon start
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, error, info};
use std::fs::OpenOptions;
use std::path::Path;
use wshuffle::cli::{self, Command, DaemonAction};
use wshuffle::config::Config;
use wshuffle::daemon::{self, SchedulerDaemon};
use wshuffle::notify::{DesktopNotifier, Notifier, SilentNotifier};
use wshuffle::player::{CmusRemote, Player};
use wshuffle::scheduler::{Request, Scheduler};
use wshuffle::{completion, selector};

type LocalScheduler = Scheduler<Box<dyn Player>, Box<dyn Notifier>>;

/// Initialize env_logger, piping into `log_file` when one is given.
///
/// Player hooks run with stderr discarded, so the file is the only place their
/// logs end up. `RUST_LOG` still controls the filter.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn open_scheduler(config: &Config) -> Result<LocalScheduler> {
    let player: Box<dyn Player> = Box::new(CmusRemote::new(config.runtime.player_command.clone()));
    let notifier: Box<dyn Notifier> = if config.scheduler.notifications {
        Box::new(DesktopNotifier)
    } else {
        Box::new(SilentNotifier)
    };
    Scheduler::open(config, player, notifier)
}

/// Run `request` in the daemon if one is up, otherwise in this process.
fn dispatch(config: &Config, request: Request) -> Result<()> {
    let summary = if daemon::is_daemon_running(&config.runtime)? {
        debug!("Forwarding {request} to daemon");
        daemon::send_request(&config.runtime.socket_path, request)?
    } else {
        open_scheduler(config)?.dispatch(request)?
    };

    info!("{request}: {summary}");
    Ok(())
}

fn run(args: cli::Args, config: Config) -> Result<()> {
    match args.command.unwrap_or(Command::React) {
        Command::React => dispatch(&config, Request::React)?,
        Command::PlayerEvent(args) if cli::is_player_hook(&args) => {
            dispatch(&config, Request::React)?
        }
        Command::PlayerEvent(args) => bail!("Unknown command: {}", args.join(" ")),
        Command::Previous => dispatch(&config, Request::Previous)?,
        Command::Score { delta } => dispatch(&config, Request::Score(delta))?,
        Command::Info => {
            let scheduler = open_scheduler(&config)?;
            let info = scheduler.current_info()?;
            println!("{}", info.path);
            match info.score {
                Some(score) => println!("score {score}, {:.2}% chance of playing", info.probability * 100.0),
                None => println!("unscored"),
            }
        }
        Command::List { limit, json: true } => {
            let scheduler = open_scheduler(&config)?;
            let records = scheduler.scores().records(limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::List { limit, json: false } => {
            let scheduler = open_scheduler(&config)?;
            let scores = scheduler.scores().all_scores()?;
            let limit = limit.unwrap_or(scores.len());
            for candidate in scores.iter().take(limit) {
                println!(
                    "{:>4}  {:>7.3}%  {}",
                    candidate.score,
                    selector::probability(candidate.score, &scores) * 100.0,
                    candidate.path
                );
            }
        }
        Command::Reset => {
            open_scheduler(&config)?.reset_ledger()?;
            println!("Session state cleared");
        }
        Command::Daemon { action } => match action {
            DaemonAction::Start { foreground } => {
                if daemon::is_daemon_running(&config.runtime)? {
                    eprintln!("Daemon is already running");
                    return Ok(());
                }

                if foreground {
                    let mut scheduler = open_scheduler(&config)?;
                    SchedulerDaemon::new(&config.runtime).run(&mut scheduler)?;
                    return Ok(());
                }

                // Fork and start daemon in background
                match unsafe { libc::fork() } {
                    0 => {
                        // Child process - become daemon
                        let mut scheduler = open_scheduler(&config)?;
                        SchedulerDaemon::new(&config.runtime).run(&mut scheduler)?;
                        std::process::exit(0);
                    }
                    pid if pid > 0 => {
                        println!("Starting scheduler daemon...");
                        std::thread::sleep(std::time::Duration::from_millis(500));

                        if daemon::is_daemon_running(&config.runtime)? {
                            println!("Daemon started successfully");
                        } else {
                            eprintln!("Failed to start daemon");
                        }
                    }
                    _ => {
                        eprintln!("Failed to fork process");
                    }
                }
            }
            DaemonAction::Stop => {
                daemon::stop_daemon(&config.runtime)?;
                println!("Daemon stopped");
            }
            DaemonAction::Status => {
                if daemon::is_daemon_running(&config.runtime)? {
                    println!("Daemon is running");
                } else {
                    println!("Daemon is not running");
                }
            }
        },
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::print_completions(shell, &mut cmd);
        }
    }

    Ok(())
}

/// Parses arguments, loads configuration, sets up logging and runs the command.
///
/// Any error that reaches this point is logged with its full chain before the
/// process exits, so failures from player hooks still leave a trace.
fn main() -> Result<()> {
    let args = cli::Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(log_file) = &args.log_file {
        config.runtime.log_path = Some(log_file.clone());
    }

    init_logging(config.runtime.log_path.as_deref())?;

    if let Err(e) = run(args, config) {
        error!("{e:?}");
        return Err(e);
    }
    Ok(())
}
