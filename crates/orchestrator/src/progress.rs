use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

use websearch_core::SearchState;
use websearch_state::StateStore;

/// Fallback tick when a caller uses [`subscribe`] rather than
/// [`subscribe_with_tick`] — matches the spec default (and every environment
/// preset, which all keep the tick at 500ms).
const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// One message on the outbound push surface (spec §4.9 / §6). Tagged so a
/// thin transport layer can serialize it straight onto a WebSocket frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StateUpdate { data: SearchState, timestamp: f64 },
    Error { message: String, timestamp: f64 },
}

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Snapshots `id`'s state every 500ms until the first terminal snapshot or
/// until the subscriber drops the stream. Multiple subscribers for the same
/// `id` each get their own independent loop — none of them affect the crawl.
/// If `id` is unknown at the first tick, emits a single error event and ends.
/// Takes owned `Arc`/`String` (rather than borrows) so the returned stream is
/// `'static` and can be driven from inside a spawned task, e.g. an axum
/// WebSocket handler.
pub fn subscribe(state: Arc<StateStore>, id: String) -> impl Stream<Item = ProgressEvent> {
    subscribe_with_tick(state, id, DEFAULT_TICK)
}

/// Same as [`subscribe`] but with a caller-supplied tick, so a deployment can
/// honor a non-default `general.progress_tick_ms` from config.
pub fn subscribe_with_tick(
    state: Arc<StateStore>,
    id: String,
    tick: Duration,
) -> impl Stream<Item = ProgressEvent> {
    let ticks = IntervalStream::new(tokio::time::interval(tick));

    ticks
        .then(move |_| {
            let state = Arc::clone(&state);
            let id = id.clone();
            async move {
                match state.get(&id).await {
                    Ok(Some(snapshot)) => {
                        let terminal = snapshot.status.is_terminal();
                        if terminal {
                            debug!(search_id = %id, "progress stream reached terminal state");
                        }
                        let event = ProgressEvent::StateUpdate {
                            data: snapshot,
                            timestamp: now(),
                        };
                        (event, terminal)
                    }
                    Ok(None) => (
                        ProgressEvent::Error {
                            message: "Search not found".to_string(),
                            timestamp: now(),
                        },
                        true,
                    ),
                    Err(err) => (
                        ProgressEvent::Error {
                            message: err.to_string(),
                            timestamp: now(),
                        },
                        true,
                    ),
                }
            }
        })
        // `take_while` would drop the terminal event itself; scan lets it
        // through once and then closes the stream on the next poll.
        .scan(false, |done, (event, terminal)| {
            let out = if *done { None } else { Some(event) };
            *done = terminal;
            futures::future::ready(out)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_serializes_with_tagged_type() {
        let event = ProgressEvent::Error {
            message: "Search not found".into(),
            timestamp: 0.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("Search not found"));
    }
}
