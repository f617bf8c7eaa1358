//! Per-room event lanes.
//!
//! Each room with traffic gets a lane: an unbounded queue drained by one
//! task that dispatches its events one at a time, awaiting each to
//! completion. Events in one room therefore reach IRC in the order the
//! homeserver sent them, across transactions, while rooms proceed
//! independently of each other.
//!
//! A lane whose queue stays empty for the idle period removes itself and
//! exits; the next event for that room opens a fresh one.

use super::Bridge;
use crate::matrix::RawEvent;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::time::timeout;
use tracing::debug;

/// How long an empty lane lingers before its task exits.
const LANE_IDLE: Duration = Duration::from_secs(300);

type Lanes = DashMap<String, mpsc::UnboundedSender<RawEvent>>;

/// Ordered dispatch of inbound events, one lane per room.
pub struct RoomLanes {
    bridge: Arc<Bridge>,
    lanes: Arc<Lanes>,
    idle: Duration,
}

impl RoomLanes {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self::with_idle(bridge, LANE_IDLE)
    }

    pub fn with_idle(bridge: Arc<Bridge>, idle: Duration) -> Self {
        Self {
            bridge,
            lanes: Arc::new(DashMap::new()),
            idle,
        }
    }

    /// Queue `event` behind every earlier event for its room.
    ///
    /// The send happens while the map entry is held, which is what lets an
    /// idle lane retire without dropping an event pushed at the same time.
    pub fn push(&self, event: RawEvent) {
        let room_id = event.room_id.clone();
        let mut lane = self
            .lanes
            .entry(room_id.clone())
            .or_insert_with(|| self.open(&room_id));
        if let Err(SendError(event)) = lane.send(event) {
            debug!(room_id = %room_id, "Event lane stopped, reopening");
            *lane = self.open(&room_id);
            let _ = lane.send(event);
        }
    }

    /// Number of open lanes.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    fn open(&self, room_id: &str) -> mpsc::UnboundedSender<RawEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(room_id = %room_id, "Opening event lane");
        tokio::spawn(run_lane(
            Arc::clone(&self.bridge),
            Arc::clone(&self.lanes),
            room_id.to_string(),
            rx,
            self.idle,
        ));
        tx
    }
}

async fn run_lane(
    bridge: Arc<Bridge>,
    lanes: Arc<Lanes>,
    room_id: String,
    mut rx: mpsc::UnboundedReceiver<RawEvent>,
    idle: Duration,
) {
    loop {
        match timeout(idle, rx.recv()).await {
            Ok(Some(event)) => bridge.dispatch(event).await,
            Ok(None) => break,
            Err(_) => {
                if lanes.remove_if(&room_id, |_, _| rx.is_empty()).is_some() {
                    break;
                }
            }
        }
    }
    debug!(room_id = %room_id, "Event lane closed");
}
