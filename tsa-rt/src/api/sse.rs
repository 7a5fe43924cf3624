//! GET /events - SSE stream of retraining events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use tsa_common::events::TsaEvent;
use tsa_common::sse::event_bus_sse_stream;

use crate::AppState;

fn is_retraining_event(event: &TsaEvent) -> bool {
    !matches!(event, TsaEvent::PostsBatchFlushed { .. })
}

pub async fn retrain_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_bus_sse_stream("retraining", &state.event_bus, is_retraining_event)
}
