//! Server-Sent Events stream of run progress.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use router::core::types::{RoutingDecision, StopReason};
use router::driver::RouterEvent;

use crate::state::{AppState, RunEvent};

#[derive(Debug, Serialize)]
struct SsePayload<'a> {
    run_id: &'a str,
    step: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a RoutingDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a StopReason>,
}

impl<'a> From<&'a RunEvent> for SsePayload<'a> {
    fn from(run_event: &'a RunEvent) -> Self {
        let base = SsePayload {
            run_id: &run_event.run_id,
            step: 0,
            decision: None,
            author: None,
            content: None,
            stop: None,
        };
        match &run_event.event {
            RouterEvent::Decided { step, decision } => SsePayload {
                step: *step,
                decision: Some(decision),
                ..base
            },
            RouterEvent::Merged {
                step,
                author,
                content,
            } => SsePayload {
                step: *step,
                author: Some(author),
                content: Some(content),
                ..base
            },
            RouterEvent::Terminated { steps, stop } => SsePayload {
                step: *steps,
                stop: Some(stop),
                ..base
            },
        }
    }
}

/// SSE event name for a run event.
fn event_name(event: &RouterEvent) -> &'static str {
    match event {
        RouterEvent::Decided { .. } => "decision",
        RouterEvent::Merged { .. } => "merged",
        RouterEvent::Terminated { .. } => "terminated",
    }
}

fn to_sse(run_event: &RunEvent) -> Option<Event> {
    let json = serde_json::to_string(&SsePayload::from(run_event)).ok()?;
    Some(Event::default().event(event_name(&run_event.event)).data(json))
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(run_event) => {
                    if let Some(event) = to_sse(&run_event) {
                        yield Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn payload(event: RouterEvent) -> Value {
        let run_event = RunEvent {
            run_id: "run-1".to_string(),
            event,
        };
        serde_json::to_value(SsePayload::from(&run_event)).expect("serialize")
    }

    #[test]
    fn decision_payload_carries_routing_symbol() {
        let value = payload(RouterEvent::Decided {
            step: 1,
            decision: RoutingDecision::worker("Web_Searcher"),
        });
        assert_eq!(
            value,
            json!({
                "run_id": "run-1",
                "step": 1,
                "decision": {"kind": "worker", "worker": "Web_Searcher"}
            })
        );
    }

    #[test]
    fn merged_and_terminated_payloads() {
        let merged = payload(RouterEvent::Merged {
            step: 2,
            author: "Insight_Researcher".to_string(),
            content: "done".to_string(),
        });
        assert_eq!(merged["author"], "Insight_Researcher");
        assert_eq!(merged["content"], "done");
        assert!(merged.get("stop").is_none());

        let terminated = payload(RouterEvent::Terminated {
            steps: 2,
            stop: StopReason::Finished,
        });
        assert_eq!(terminated["step"], 2);
        assert_eq!(terminated["stop"], json!({"reason": "finished"}));
    }

    #[test]
    fn event_names_match_phases() {
        assert_eq!(
            event_name(&RouterEvent::Decided {
                step: 0,
                decision: RoutingDecision::Finish
            }),
            "decision"
        );
        assert_eq!(
            event_name(&RouterEvent::Terminated {
                steps: 0,
                stop: StopReason::Finished
            }),
            "terminated"
        );
    }
}
