//! # flowgate-server
//!
//! Axum HTTP + WebSocket front end for the Flowgate gateway.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `server` | Router, shared state, bind/serve, graceful stop |
//! | `ws` | Handshake auth, upgrade, per-client read/write loops |
//! | `heartbeat` | Missed-pong accounting per channel |
//! | `config` | Defaults ← JSON file ← `FLOWGATE_*` env overrides |
//! | `health` | `/health` payload |
//! | `metrics` | Prometheus recorder and metric names |
//! | `shutdown` | CancellationToken coordinator |

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use server::{AppState, GatewayServer};
pub use shutdown::ShutdownCoordinator;
