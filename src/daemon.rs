//! # Scheduler Daemon
//!
//! A long-lived process that owns the scheduler and serves requests over a Unix
//! socket, so that rapid player events can never run two transitions at once.
//!
//! ## Architecture
//!
//! ```text
//! cmus event → wshuffle react ──┐
//! key binding → wshuffle score 1 ┼─ socket ─→ connection threads ─→ mailbox ─→ scheduler
//! key binding → wshuffle previous┘                                  (single writer)
//! ```
//!
//! Each connection is read on its own thread and turned into a job on an
//! `mpsc` mailbox. Only the thread that owns the [`Scheduler`] drains the
//! mailbox, one job at a time, so the check-record-select-enqueue sequence of a
//! transition is never interleaved with another request.
//!
//! ## Wire Format
//!
//! One line per connection each way:
//!
//! ```text
//! → score 1
//! ← ok /music/song.flac: 2 -> 3 (4.17% chance)
//! ```
//!
//! Failures come back as `err <message>`; the daemon logs them and keeps serving.

use crate::config::RuntimeConfig;
use crate::notify::Notifier;
use crate::player::Player;
use crate::scheduler::{Request, Scheduler};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

/// A request waiting for the scheduler, with the channel its reply goes to.
struct Job {
    request: Result<Request>,
    reply: mpsc::Sender<String>,
}

/// Socket server wrapped around one scheduler.
#[derive(Debug)]
pub struct SchedulerDaemon {
    /// Unix socket clients connect to
    socket_path: PathBuf,
    /// Path to PID file for daemon management
    pid_file: PathBuf,
}

impl SchedulerDaemon {
    pub fn new(runtime: &RuntimeConfig) -> Self {
        Self {
            socket_path: runtime.socket_path.clone(),
            pid_file: runtime.pid_file.clone(),
        }
    }

    /// Bind the socket, replacing a stale one left by a killed daemon.
    pub fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            debug!("Removing stale socket {}", self.socket_path.display());
            fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket {}", self.socket_path.display())
            })?;
        }

        UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind {}", self.socket_path.display()))
    }

    /// Write the PID file, bind and serve until the process is terminated.
    pub fn run<P: Player, N: Notifier>(&self, scheduler: &mut Scheduler<P, N>) -> Result<()> {
        let pid = std::process::id();
        fs::write(&self.pid_file, pid.to_string())
            .with_context(|| format!("Failed to write PID file {}", self.pid_file.display()))?;
        info!("Daemon started with PID {pid}");

        let listener = self.bind()?;
        let result = serve(scheduler, listener);

        let _ = fs::remove_file(&self.socket_path);
        let _ = fs::remove_file(&self.pid_file);
        result
    }
}

/// Serve requests from `listener` until every connection source is gone.
///
/// The calling thread becomes the only one that touches `scheduler`.
pub fn serve<P: Player, N: Notifier>(
    scheduler: &mut Scheduler<P, N>,
    listener: UnixListener,
) -> Result<()> {
    let (mailbox, jobs) = mpsc::channel::<Job>();

    thread::Builder::new()
        .name("wshuffle-accept".to_string())
        .spawn(move || accept_loop(listener, mailbox))
        .context("Failed to start accept thread")?;

    info!("Serving requests");
    for job in jobs {
        let reply = match job.request {
            Ok(request) => match scheduler.dispatch(request) {
                Ok(summary) => {
                    info!("{request}: {summary}");
                    format!("ok {summary}")
                }
                Err(e) => {
                    error!("{request} failed: {e:?}");
                    format!("err {}", one_line(&format!("{e:#}")))
                }
            },
            Err(e) => {
                warn!("Rejected request: {e:#}");
                format!("err {}", one_line(&format!("{e:#}")))
            }
        };

        // The client may have hung up; nothing to do about it
        let _ = job.reply.send(reply);
    }

    Ok(())
}

fn accept_loop(listener: UnixListener, mailbox: mpsc::Sender<Job>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let mailbox = mailbox.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(&stream, &mailbox) {
                        warn!("Connection failed: {e:#}");
                    }
                });
            }
            Err(e) => warn!("Failed to accept connection: {e}"),
        }
    }
}

fn handle_connection(stream: &UnixStream, mailbox: &mpsc::Sender<Job>) -> Result<()> {
    let mut line = String::new();
    BufReader::new(stream)
        .read_line(&mut line)
        .context("Failed to read request")?;

    let (reply_tx, reply_rx) = mpsc::channel();
    mailbox
        .send(Job { request: line.parse(), reply: reply_tx })
        .map_err(|_| anyhow!("Scheduler is no longer running"))?;

    let reply = reply_rx.recv().context("Scheduler dropped the request")?;
    let mut stream = stream;
    writeln!(stream, "{reply}").context("Failed to write reply")?;
    Ok(())
}

fn one_line(message: &str) -> String {
    message.lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

/// Send `request` to the daemon listening on `socket_path` and return its
/// summary.
///
/// # Errors
///
/// Fails if the daemon cannot be reached, or if it reports that the request
/// failed.
pub fn send_request(socket_path: &Path, request: Request) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path)
        .with_context(|| format!("Failed to connect to daemon at {}", socket_path.display()))?;

    writeln!(stream, "{request}").context("Failed to send request to daemon")?;
    stream.shutdown(Shutdown::Write)?;

    let mut reply = String::new();
    stream
        .read_to_string(&mut reply)
        .context("Failed to read daemon reply")?;

    parse_reply(&reply)
}

fn parse_reply(reply: &str) -> Result<String> {
    let reply = reply.trim_end();
    let (status, message) = reply.split_once(' ').unwrap_or((reply, ""));
    match status {
        "ok" => Ok(message.to_string()),
        "err" => bail!("Daemon reported an error: {message}"),
        _ => bail!("Malformed daemon reply: {reply}"),
    }
}

fn read_pid(pid_file: &Path) -> Result<libc::pid_t> {
    let pid_str = fs::read_to_string(pid_file)?;
    pid_str
        .trim()
        .parse()
        .context("Invalid PID in daemon file")
}

/// Check if the daemon is running
pub fn is_daemon_running(runtime: &RuntimeConfig) -> Result<bool> {
    if !runtime.pid_file.exists() {
        return Ok(false);
    }

    let pid = read_pid(&runtime.pid_file)?;
    // Signal 0 only checks that the process exists
    Ok(unsafe { libc::kill(pid, 0) } == 0)
}

/// Stop the running daemon
pub fn stop_daemon(runtime: &RuntimeConfig) -> Result<()> {
    if !runtime.pid_file.exists() {
        bail!("Daemon is not running");
    }

    let pid = read_pid(&runtime.pid_file)?;
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        warn!(
            "Failed to signal daemon (PID {pid}): {}",
            std::io::Error::last_os_error()
        );
    }

    fs::remove_file(&runtime.pid_file)?;
    let _ = fs::remove_file(&runtime.socket_path);

    info!("Daemon stopped (PID: {pid})");
    Ok(())
}
