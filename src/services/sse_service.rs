use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dao::{models::RoomEntity, room_store::RoomFeed},
    dto::sse::{RoomClosedEvent, ServerEvent},
    error::ServiceError,
    services::room_service::load_room,
    state::SharedState,
};

const SNAPSHOT_EVENT: &str = "room.snapshot";
const CLOSED_EVENT: &str = "room.closed";

/// A room's change feed paired with the snapshot observers start from.
pub struct RoomSubscription {
    room_id: String,
    initial: RoomEntity,
    feed: RoomFeed,
}

/// Subscribe to a room. Unknown rooms are rejected before a feed is opened; the snapshot is
/// then read again behind the open feed so no commit is missed.
pub async fn subscribe_room(
    state: &SharedState,
    room_id: &str,
) -> Result<RoomSubscription, ServiceError> {
    let store = state.require_room_store().await?;
    load_room(&store, room_id).await?;
    let feed = store.observe(room_id);
    let initial = load_room(&store, room_id).await?;
    Ok(RoomSubscription {
        room_id: room_id.to_owned(),
        initial,
        feed,
    })
}

fn snapshot_event(room: &RoomEntity) -> Option<ServerEvent> {
    match ServerEvent::json(Some(SNAPSHOT_EVENT.to_string()), room) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to encode room snapshot");
            None
        }
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a room subscription into an SSE response: the current snapshot first, then one
/// snapshot per committed mutation, and a closing event once the room is deleted.
pub fn to_sse_stream(
    subscription: RoomSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let RoomSubscription {
        room_id,
        initial,
        mut feed,
    } = subscription;
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(event) = snapshot_event(&initial)
            && tx.send(Ok(to_event(event))).await.is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = feed.recv() => {
                    let payload = match recv_result {
                        Ok(change) => match change.room {
                            Some(room) => snapshot_event(&room),
                            None => {
                                let closed = ServerEvent::json(
                                    Some(CLOSED_EVENT.to_string()),
                                    &RoomClosedEvent { room_id: room_id.clone() },
                                );
                                if let Ok(event) = closed {
                                    let _ = tx.send(Ok(to_event(event))).await;
                                }
                                break;
                            }
                        },
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next snapshot supersedes whatever was skipped.
                            debug!(room = %room_id, skipped, "SSE observer lagged");
                            continue;
                        }
                    };
                    if let Some(event) = payload
                        && tx.send(Ok(to_event(event))).await.is_err()
                    {
                        break;
                    }
                }
            }
        }

        info!(room = %room_id, "room SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
