pub mod access_list;
pub mod callsign;
pub mod client;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod heard;
pub mod logging;
pub mod outbound_queue;
pub mod peer;
pub mod peer_protocol;
pub mod reflector;
pub mod registry;
pub mod stream_registry;
pub mod transcoder;
pub mod wire;
