//! mpv Embedded Player Host
//!
//! Drives a single mpv process over its JSON IPC socket. Starting the process
//! is the one-time API load; each player is a `loadfile` of the video's
//! watch URL into that process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::embed::{EmbedHost, EmbedOptions, EmbeddedPlayer, PlayerState};
use super::source::watch_url;
use crate::types::TimeSec;
use crate::{CoreError, CoreResult};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

type PendingReplies = Arc<StdMutex<HashMap<u64, oneshot::Sender<CoreResult<Value>>>>>;

// =============================================================================
// IPC Connection
// =============================================================================

/// Request/response channel to an mpv IPC socket.
///
/// Replies are matched by `request_id`; asynchronous events are broadcast
/// by name.
pub(crate) struct MpvConnection {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingReplies,
    next_id: AtomicU64,
    events: broadcast::Sender<String>,
    reader: JoinHandle<()>,
}

impl MpvConnection {
    pub(crate) fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: PendingReplies = Arc::new(StdMutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(64);

        let reader = tokio::spawn(read_replies(
            BufReader::new(read_half),
            Arc::clone(&pending),
            events.clone(),
        ));

        Self {
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            events,
            reader,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    /// Sends a command and waits for its reply data
    pub(crate) async fn command(&self, args: Vec<Value>) -> CoreResult<Value> {
        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, tx);

        let mut line = json!({ "command": args, "request_id": request_id }).to_string();
        line.push('\n');

        let written = {
            let mut writer = self.writer.lock().await;
            writer.write_all(line.as_bytes()).await
        };
        if let Err(e) = written {
            self.forget(request_id);
            return Err(CoreError::EmbedFailed(format!("mpv IPC write failed: {}", e)));
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CoreError::EmbedFailed("mpv connection closed".to_string())),
            Err(_) => {
                self.forget(request_id);
                Err(CoreError::EmbedFailed(format!(
                    "mpv did not answer {}",
                    args.first().map(Value::to_string).unwrap_or_default()
                )))
            }
        }
    }

    pub(crate) async fn get_property(&self, name: &str) -> CoreResult<Value> {
        self.command(vec![json!("get_property"), json!(name)]).await
    }

    pub(crate) async fn set_property(&self, name: &str, value: Value) -> CoreResult<()> {
        self.command(vec![json!("set_property"), json!(name), value])
            .await
            .map(|_| ())
    }

    fn forget(&self, request_id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request_id);
    }
}

impl Drop for MpvConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_replies<R>(mut reader: BufReader<R>, pending: PendingReplies, events: broadcast::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("mpv IPC read failed: {}", e);
                break;
            }
        }

        let message: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(e) => {
                debug!("Ignoring malformed mpv message: {}", e);
                continue;
            }
        };

        if let Some(request_id) = message.get("request_id").and_then(Value::as_u64) {
            let waiter = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&request_id);
            if let Some(waiter) = waiter {
                let _ = waiter.send(reply_result(&message));
            }
        } else if let Some(event) = message.get("event").and_then(Value::as_str) {
            let _ = events.send(event.to_string());
        }
    }

    // Dropping the senders fails every outstanding request.
    pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
}

fn reply_result(message: &Value) -> CoreResult<Value> {
    match message.get("error").and_then(Value::as_str) {
        Some("success") | None => Ok(message.get("data").cloned().unwrap_or(Value::Null)),
        Some(error) => Err(CoreError::EmbedFailed(format!("mpv: {}", error))),
    }
}

// =============================================================================
// Player
// =============================================================================

/// A video loaded into the shared mpv process
pub struct MpvPlayer {
    connection: Arc<MpvConnection>,
}

impl MpvPlayer {
    async fn flag(&self, name: &str) -> bool {
        self.connection
            .get_property(name)
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn seconds(&self, name: &str) -> CoreResult<TimeSec> {
        match self.connection.get_property(name).await {
            Ok(value) => Ok(value.as_f64().unwrap_or(0.0)),
            // Unavailable until the demuxer knows the value
            Err(CoreError::EmbedFailed(msg)) if msg.contains("property unavailable") => Ok(0.0),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EmbeddedPlayer for MpvPlayer {
    async fn play_video(&self) -> CoreResult<()> {
        self.connection.set_property("pause", json!(false)).await
    }

    async fn pause_video(&self) -> CoreResult<()> {
        self.connection.set_property("pause", json!(true)).await
    }

    async fn seek_to(&self, seconds: TimeSec, allow_seek_ahead: bool) -> CoreResult<()> {
        let mode = if allow_seek_ahead { "absolute" } else { "absolute+keyframes" };
        self.connection
            .command(vec![json!("seek"), json!(seconds.max(0.0)), json!(mode)])
            .await
            .map(|_| ())
    }

    async fn current_time(&self) -> CoreResult<TimeSec> {
        self.seconds("time-pos").await
    }

    async fn duration(&self) -> CoreResult<TimeSec> {
        self.seconds("duration").await
    }

    async fn state(&self) -> CoreResult<PlayerState> {
        if self.flag("idle-active").await {
            return Ok(PlayerState::Unstarted);
        }
        if self.flag("eof-reached").await {
            return Ok(PlayerState::Ended);
        }
        if self.flag("paused-for-cache").await {
            return Ok(PlayerState::Buffering);
        }
        if self.flag("pause").await {
            return Ok(PlayerState::Paused);
        }
        Ok(PlayerState::Playing)
    }

    async fn destroy(&self) {
        if let Err(e) = self.connection.command(vec![json!("stop")]).await {
            debug!("mpv stop failed: {}", e);
        }
    }
}

// =============================================================================
// Host
// =============================================================================

/// Embed host backed by a long-lived mpv process
pub struct MpvHost {
    mpv_path: PathBuf,
    socket_path: PathBuf,
    process: Mutex<Option<Child>>,
    connection: Mutex<Option<Arc<MpvConnection>>>,
}

impl MpvHost {
    pub fn new(mpv_path: impl Into<PathBuf>) -> Self {
        let socket_path =
            std::env::temp_dir().join(format!("volleycut-mpv-{}.sock", std::process::id()));
        Self {
            mpv_path: mpv_path.into(),
            socket_path,
            process: Mutex::new(None),
            connection: Mutex::new(None),
        }
    }

    fn player_args(&self, options: &EmbedOptions) -> Vec<String> {
        let mut args = vec![
            "--idle=yes".to_string(),
            "--force-window=yes".to_string(),
            "--no-terminal".to_string(),
            "--keep-open=yes".to_string(),
            format!("--input-ipc-server={}", self.socket_path.display()),
        ];
        if !options.controls {
            args.push("--osc=no".to_string());
        }
        args
    }

    async fn connect(&self) -> CoreResult<UnixStream> {
        let mut last_error = None;
        for _ in 0..CONNECT_ATTEMPTS {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        }
        Err(CoreError::EmbedFailed(format!(
            "Could not connect to mpv at {}: {}",
            self.socket_path.display(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn connection(&self) -> CoreResult<Arc<MpvConnection>> {
        self.connection
            .lock()
            .await
            .clone()
            .ok_or_else(|| CoreError::EmbedFailed("player API not loaded".to_string()))
    }
}

#[async_trait]
impl EmbedHost for MpvHost {
    async fn load_api(&self) -> CoreResult<()> {
        let _ = std::fs::remove_file(&self.socket_path);

        let child = Command::new(&self.mpv_path)
            .args(self.player_args(&EmbedOptions::default()))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CoreError::EmbedFailed(format!(
                    "Failed to start {}: {}",
                    self.mpv_path.display(),
                    e
                ))
            })?;
        *self.process.lock().await = Some(child);

        let stream = self.connect().await?;
        *self.connection.lock().await = Some(Arc::new(MpvConnection::new(stream)));

        info!("mpv ready on {}", self.socket_path.display());
        Ok(())
    }

    async fn create_player(
        &self,
        video_id: &str,
        options: &EmbedOptions,
    ) -> CoreResult<Arc<dyn EmbeddedPlayer>> {
        let connection = self.connection().await?;
        let url = watch_url(video_id);

        if !options.related_videos {
            // Nothing queued after the video
            let _ = connection.command(vec![json!("playlist-clear")]).await;
        }

        let mut events = connection.subscribe();
        connection.set_property("pause", json!(true)).await?;
        connection
            .command(vec![json!("loadfile"), json!(url), json!("replace")])
            .await?;

        let loaded = tokio::time::timeout(FILE_LOAD_TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(event) if event == "file-loaded" => return Ok(()),
                    Ok(event) if event == "end-file" => {
                        return Err(CoreError::EmbedFailed(format!("mpv could not open {}", url)))
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CoreError::EmbedFailed("mpv connection closed".to_string()))
                    }
                }
            }
        })
        .await
        .map_err(|_| CoreError::EmbedFailed(format!("Timed out loading {}", url)))?;
        loaded?;

        debug!("mpv loaded {}", url);
        Ok(Arc::new(MpvPlayer { connection }))
    }
}

impl Drop for MpvHost {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
