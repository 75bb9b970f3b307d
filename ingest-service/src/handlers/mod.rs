//! HTTP handlers for the ingest & lifecycle orchestrator — §4.7.
//!
//! - `uploads`: session creation, refresh, checksum registration, complete, abort, status
//! - `videos`: listing, detail, soft delete
//! - `ws`: status fan-out websocket

pub mod uploads;
pub mod videos;
pub mod ws;

pub use uploads::{
    abort_upload, complete_upload, refresh_urls, register_part_checksums, start_upload,
    upload_status,
};
pub use videos::{delete_video, get_video, list_videos};
pub use ws::ws_handler;
