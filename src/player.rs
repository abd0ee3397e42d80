use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use serde_json::json;

use crate::debug;
use crate::playback::{MediaEvent, MediaSurface};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::io::{BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use rand::distributions::Alphanumeric;
#[cfg(unix)]
use rand::Rng;

/// Property-observation ids registered on the mpv IPC socket.
const OBSERVE_DURATION: u64 = 1;
const OBSERVE_TIME_POS: u64 = 2;
const OBSERVE_PAUSE: u64 = 3;

pub struct LaunchOptions<'a> {
    pub mpv_path: &'a str,
    pub url: &'a str,
    pub title: &'a str,
    pub loop_file: bool,
    /// Target cell rectangle inside the terminal, 0-based.
    pub col: u16,
    pub row: u16,
    pub term_cols: i32,
    pub term_rows: i32,
    pub pixel_width: i32,
    pub pixel_height: i32,
}

/// Commands the feed issues to the inline player over IPC.
#[derive(Clone, Copy, Debug)]
pub enum PlayerCommand {
    SetPause(bool),
    SeekAbsolute(f64),
    SetMute(bool),
}

/// One inline mpv process rendering into the terminal via the kitty graphics
/// protocol. The process starts paused and muted-neutral; all playback state
/// is driven through IPC so the feed's state machine stays the single owner.
pub struct InlineSession {
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    events_rx: Receiver<MediaEvent>,
    handle: Option<thread::JoinHandle<()>>,
    event_handle: Option<thread::JoinHandle<()>>,
    ipc_path: Option<Arc<String>>,
}

impl InlineSession {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.event_handle.take() {
            let _ = handle.join();
        }
    }

    /// Non-blocking exit probe; the UI polls this each tick.
    pub fn try_status(&mut self) -> Option<Result<ExitStatus>> {
        match self.status_rx.try_recv() {
            Ok(res) => {
                self.finalize();
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                Some(Err(anyhow!("player session closed unexpectedly")))
            }
        }
    }

    pub fn stop_blocking(mut self) -> Option<Result<ExitStatus>> {
        let _ = self.kill_tx.send(());
        let res = self.status_rx.recv().ok();
        self.finalize();
        res
    }

    pub fn controls_supported(&self) -> bool {
        self.ipc_path.is_some()
    }

    /// Drain observed property changes since the last poll.
    pub fn poll_events(&self) -> Vec<MediaEvent> {
        self.events_rx.try_iter().collect()
    }

    pub fn send_command(&self, command: PlayerCommand) -> Result<()> {
        let Some(path) = &self.ipc_path else {
            return Err(anyhow!(
                "inline player controls are not supported on this platform"
            ));
        };
        send_ipc_command(path, command)
    }
}

impl Drop for InlineSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.kill_tx.send(());
            let _ = self.status_rx.recv().ok();
            self.finalize();
        }
    }
}

impl MediaSurface for InlineSession {
    fn play(&mut self) -> Result<()> {
        self.send_command(PlayerCommand::SetPause(false))
            .context("start inline playback")
    }

    fn pause(&mut self) {
        if let Err(err) = self.send_command(PlayerCommand::SetPause(true)) {
            debug::log(format!("pause command failed: {err:#}"));
        }
    }

    fn seek(&mut self, position_secs: f64) {
        if let Err(err) = self.send_command(PlayerCommand::SeekAbsolute(position_secs)) {
            debug::log(format!("seek command failed: {err:#}"));
        }
    }

    fn set_muted(&mut self, muted: bool) {
        if let Err(err) = self.send_command(PlayerCommand::SetMute(muted)) {
            debug::log(format!("mute command failed: {err:#}"));
        }
    }
}

pub fn spawn_inline_player(opts: LaunchOptions<'_>) -> Result<InlineSession> {
    if opts.url.trim().is_empty() {
        return Err(anyhow!("video URL missing"));
    }

    let (kill_tx, kill_rx) = bounded::<()>(1);
    let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);
    let (events_tx, events_rx) = unbounded::<MediaEvent>();

    let mpv_path = opts.mpv_path.to_string();
    let url = opts.url.to_string();
    let title = opts.title.to_string();
    #[cfg(unix)]
    let ipc_path = unique_ipc_path();
    #[cfg(not(unix))]
    let ipc_path: Option<String> = None;
    let ipc_path_for_session = ipc_path.clone();
    let ipc_path_for_events = ipc_path.clone();
    debug::log(format!(
        "spawning inline mpv term={}x{} pixels={}x{} url={} ipc={}",
        opts.term_cols,
        opts.term_rows,
        opts.pixel_width,
        opts.pixel_height,
        url,
        ipc_path.as_deref().unwrap_or("n/a")
    ));
    #[cfg(unix)]
    if let Some(path) = &ipc_path {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug::log(format!("failed to remove stale mpv ipc path {path}: {err}"));
            }
        }
    }
    let ipc_arg = ipc_path
        .as_ref()
        .map(|path| format!("--input-ipc-server={path}"));
    let loop_arg = if opts.loop_file {
        "--loop-file=inf"
    } else {
        "--loop-file=no"
    };

    let left = u32::from(opts.col).saturating_add(1);
    let top = u32::from(opts.row).saturating_add(1);
    let term_cols = opts.term_cols.max(1);
    let term_rows = opts.term_rows.max(1);
    let pixel_width = opts.pixel_width.max(1);
    let pixel_height = opts.pixel_height.max(1);

    let handle = thread::spawn(move || {
        let ipc_cleanup = ipc_path.clone();
        let result = (|| -> Result<ExitStatus> {
            let mut args = vec![
                url.clone(),
                "--vo=kitty".to_string(),
                format!("--vo-kitty-cols={term_cols}"),
                format!("--vo-kitty-rows={term_rows}"),
                format!("--vo-kitty-left={left}"),
                format!("--vo-kitty-top={top}"),
                format!("--vo-kitty-width={pixel_width}"),
                format!("--vo-kitty-height={pixel_height}"),
                "--vo-kitty-config-clear=no".to_string(),
                "--force-window=no".to_string(),
                "--keep-open=no".to_string(),
                // The feed decides when playback starts; never autostart.
                "--pause".to_string(),
                loop_arg.to_string(),
                "--really-quiet".to_string(),
                "--idle=no".to_string(),
                "--terminal=no".to_string(),
                "--input-terminal=no".to_string(),
                "--no-config".to_string(),
                "--ytdl=no".to_string(),
                "--osc=no".to_string(),
                "--osd-level=0".to_string(),
                "--osd-duration=0".to_string(),
            ];
            if let Some(arg) = &ipc_arg {
                args.push(arg.clone());
            }
            if !title.is_empty() {
                args.push(format!("--force-media-title={title}"));
            }

            debug::log(format!("mpv args: {args:?}"));

            let mut command = Command::new(&mpv_path);
            for arg in &args {
                command.arg(arg);
            }

            command.stdin(Stdio::null());
            #[cfg(unix)]
            {
                use std::os::unix::io::{AsRawFd, FromRawFd};

                // mpv must write graphics escapes to the real terminal, not a
                // captured pipe.
                let stdout = std::io::stdout();
                let fd = stdout.as_raw_fd();
                let dup_fd = unsafe { libc::dup(fd) };
                if dup_fd >= 0 {
                    let stdio = unsafe { Stdio::from_raw_fd(dup_fd) };
                    command.stdout(stdio);
                } else {
                    command.stdout(Stdio::inherit());
                }
            }
            #[cfg(not(unix))]
            {
                command.stdout(Stdio::inherit());
            }
            command.stderr(Stdio::null());

            let mut child = command
                .spawn()
                .with_context(|| format!("launch mpv to play {url}"))?;

            loop {
                if kill_rx.try_recv().is_ok() {
                    let _ = child.kill();
                    let status = child.wait().context("wait for mpv after stop request")?;
                    debug::log(format!("mpv stopped with status {:?}", status.code()));
                    return Ok(status);
                }

                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug::log(format!("mpv exited with status {:?}", status.code()));
                        return Ok(status);
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(30)),
                    Err(err) => {
                        return Err(anyhow!(err)).context("poll mpv status");
                    }
                }
            }
        })();
        #[cfg(unix)]
        if let Some(path) = ipc_cleanup {
            cleanup_ipc_path(&path);
        }
        #[cfg(not(unix))]
        let _ = ipc_cleanup;

        let _ = status_tx.send(result);
    });

    let event_handle = ipc_path_for_events
        .map(|path| thread::spawn(move || observe_properties(&path, events_tx)));

    Ok(InlineSession {
        kill_tx,
        status_rx,
        events_rx,
        handle: Some(handle),
        event_handle,
        ipc_path: ipc_path_for_session.map(Arc::new),
    })
}

/// mpv creates the IPC socket some time after spawn. Every connection —
/// the observer thread and each command — waits for it to appear, otherwise
/// the first `play` issued right after a dominance change lands on ENOENT.
#[cfg(unix)]
fn connect_ipc(path: &str) -> std::io::Result<UnixStream> {
    const CONNECT_RETRIES: usize = 50;
    const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

    let mut attempt = 0;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                attempt += 1;
                if attempt >= CONNECT_RETRIES {
                    return Err(err);
                }
                thread::sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
}

/// Subscribe to the properties the feed mirrors and pump change notifications
/// into the event channel until mpv exits. Runs on its own thread.
#[cfg(unix)]
fn observe_properties(path: &str, events: Sender<MediaEvent>) {
    let mut stream = match connect_ipc(path) {
        Ok(stream) => stream,
        Err(err) => {
            debug::log(format!("mpv ipc connect failed: {err}"));
            return;
        }
    };

    let subscriptions = [
        json!({"command": ["observe_property", OBSERVE_DURATION, "duration"]}),
        json!({"command": ["observe_property", OBSERVE_TIME_POS, "time-pos"]}),
        json!({"command": ["observe_property", OBSERVE_PAUSE, "pause"]}),
    ];
    for subscription in &subscriptions {
        let serialized = match serde_json::to_string(subscription) {
            Ok(serialized) => serialized,
            Err(err) => {
                debug::log(format!("serialize mpv subscription: {err}"));
                return;
            }
        };
        if stream
            .write_all(serialized.as_bytes())
            .and_then(|()| stream.write_all(b"\n"))
            .is_err()
        {
            return;
        }
    }

    let reader = BufReader::new(stream);
    for line in reader.lines().map_while(std::result::Result::ok) {
        if let Some(event) = parse_ipc_event(&line) {
            if events.send(event).is_err() {
                return;
            }
        }
    }
}

#[cfg(not(unix))]
fn observe_properties(_path: &str, _events: Sender<MediaEvent>) {}

/// Translate one mpv IPC event line into the feed's media-event vocabulary.
/// Non-event lines (command replies) and unobserved properties yield None.
fn parse_ipc_event(line: &str) -> Option<MediaEvent> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    match value.get("event")?.as_str()? {
        "property-change" => match value.get("name")?.as_str()? {
            "duration" => Some(MediaEvent::MetadataLoaded {
                duration_secs: value.get("data")?.as_f64()?,
            }),
            "time-pos" => Some(MediaEvent::Progress {
                position_secs: value.get("data")?.as_f64()?,
            }),
            "pause" => {
                if value.get("data")?.as_bool()? {
                    Some(MediaEvent::Paused)
                } else {
                    Some(MediaEvent::Played)
                }
            }
            _ => None,
        },
        "end-file" => {
            let reason = value.get("reason").and_then(|r| r.as_str()).unwrap_or("");
            if reason == "error" {
                Some(MediaEvent::Error {
                    message: value
                        .get("file_error")
                        .and_then(|e| e.as_str())
                        .unwrap_or("playback ended with an error")
                        .to_string(),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

fn send_ipc_command(path: &str, command: PlayerCommand) -> Result<()> {
    let payload = json!({
        "command": command_payload(command),
    });
    let serialized = serde_json::to_string(&payload).context("serialize mpv command")?;
    send_ipc_command_inner(path, &serialized)
}

#[cfg(unix)]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    let mut stream =
        connect_ipc(path).with_context(|| format!("connect to mpv IPC socket {path}"))?;
    stream
        .write_all(serialized.as_bytes())
        .context("write mpv IPC command")?;
    stream
        .write_all(b"\n")
        .context("write mpv IPC command terminator")?;
    Ok(())
}

#[cfg(not(unix))]
fn send_ipc_command_inner(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!(
        "inline player controls are not supported on this platform"
    ))
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("clipfeed-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug::log(format!("failed to remove mpv ipc path {path}: {err}"));
        }
    }
}

fn command_payload(command: PlayerCommand) -> serde_json::Value {
    match command {
        PlayerCommand::SetPause(paused) => json!(["set_property", "pause", paused]),
        PlayerCommand::SeekAbsolute(position) => json!(["seek", position, "absolute"]),
        PlayerCommand::SetMute(muted) => json!(["set_property", "mute", muted]),
    }
}
