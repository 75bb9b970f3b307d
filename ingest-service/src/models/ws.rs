//! Websocket frame protocol for `/ws` — §4.7.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use video_core::StatusEvent;

/// Inbound frames from client to server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WsInboundFrame {
    Subscribe {
        #[serde(rename = "videoId")]
        video_id: Uuid,
    },
    Unsubscribe {
        #[serde(rename = "videoId")]
        video_id: Uuid,
    },
}

/// Outbound frames from server to client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutboundFrame {
    Subscribed {
        #[serde(rename = "videoId")]
        video_id: Uuid,
    },
    Unsubscribed {
        #[serde(rename = "videoId")]
        video_id: Uuid,
    },
    Status(StatusEvent),
    Error {
        message: String,
    },
}
