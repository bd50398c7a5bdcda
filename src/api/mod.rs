//! API endpoint handlers for the torrent gateway.

pub mod health;
pub mod stream;
pub mod torrents;
