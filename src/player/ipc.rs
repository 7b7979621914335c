use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn time_pos_request() -> String {
    serde_json::json!({ "command": ["get_property", "time-pos"] }).to_string()
}

/// Extract a whole-second playback position from one response line.
///
/// A missing or non-numeric `data` field is not an error, just
/// "no update this cycle".
pub(crate) fn parse_time_pos(line: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let secs = value.get("data")?.as_f64()?;
    if secs < 0.0 {
        return None;
    }
    Some(secs as u64)
}

/// Poll the player's control socket for the current time position until
/// cancelled.
///
/// The player creates the socket asynchronously after spawn, so
/// connection attempts retry with a short backoff. Dropped connections
/// and malformed responses are tolerated. Every sleep races the stop
/// token, keeping cancellation latency bounded by the poll interval.
pub(crate) async fn poll_position(
    socket: PathBuf,
    position: Arc<Mutex<u64>>,
    stop: CancellationToken,
    poll_interval: Duration,
    connect_retry: Duration,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            connected = UnixStream::connect(&socket) => {
                if let Ok(stream) = connected {
                    query_loop(stream, &position, &stop, poll_interval).await;
                    if stop.is_cancelled() {
                        return;
                    }
                }
            }
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = sleep(connect_retry) => {}
        }
    }
}

/// Request/response cycle over one established connection. Returns on
/// cancellation or when the connection becomes unusable; the caller
/// decides whether to reconnect.
async fn query_loop(
    stream: UnixStream,
    position: &Arc<Mutex<u64>>,
    stop: &CancellationToken,
    poll_interval: Duration,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let request = format!("{}\n", time_pos_request());

    loop {
        if write_half.write_all(request.as_bytes()).await.is_err() {
            return;
        }

        let line = tokio::select! {
            _ = stop.cancelled() => return,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if let Some(secs) = parse_time_pos(&line) {
                    *position.lock().unwrap() = secs;
                }
            }
            Ok(None) | Err(_) => return,
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = sleep(poll_interval) => {}
        }
    }
}
