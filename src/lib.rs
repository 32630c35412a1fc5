// Ambient infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Per-connection state
pub mod connection_manager;
pub mod ratelimit;
pub mod rooms;
pub mod session;
pub mod tags;

// Routing and orchestration
pub mod broker;
pub mod dispatcher;

// Transports and HTTP surface
pub mod api;
pub mod server;
pub mod websocket;

// Initiating side
pub mod client;
