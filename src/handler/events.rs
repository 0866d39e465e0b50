use std::{convert::Infallible, sync::Arc};

use axum::{
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use crate::{middleware::JWTAuthMiddeware, AppState};

pub fn events_handler() -> Router {
    Router::new().route("/", get(job_events))
}

/// Server-sent stream of changes to jobs the caller may see. A `resync`
/// event tells the client it missed updates and should refetch.
pub async fn job_events(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = app_state.event_bus.subscribe();
    let viewer_id = user.user.id;
    let viewer_role = user.user.role();

    tracing::debug!("Event stream opened for {}", viewer_id);

    let events = stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if !event.visible_to(viewer_id, viewer_role) {
                        continue;
                    }
                    match Event::default().event(event.kind.to_str()).json_data(&event) {
                        Ok(sse_event) => return Some((Ok(sse_event), receiver)),
                        Err(e) => {
                            tracing::warn!("Could not encode job event: {}", e);
                            continue;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream for {} skipped {} events", viewer_id, skipped);
                    let resync = Event::default().event("resync").data(skipped.to_string());
                    return Some((Ok(resync), receiver));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
