//! # VoyageGate
//!
//! A stateful HTTP gateway in front of a hotel-booking upstream: it
//! normalizes destination strings to region ids, caches search and static
//! content, and drives bookings through a persisted state machine.
//!
//! ## Architecture
//!
//! - `config`: environment-driven startup configuration
//! - `error`: the gateway-wide error taxonomy
//! - `telemetry`: structured logging bootstrap
//! - `deadline`: the absolute per-request cancellation budget
//! - `governor`: per-endpoint rate-limit admission control
//! - `upstream`: the sole adapter to the upstream HTTP surface
//! - `database`: connection pooling, migrations, and the cache/catalogue/orders stores
//! - `resolver`: destination-string resolution
//! - `search`: the search orchestrator
//! - `booking`: the booking state machine
//! - `api`: the HTTP surface

pub mod api;
pub mod booking;
pub mod config;
pub mod database;
pub mod deadline;
pub mod error;
pub mod governor;
pub mod resolver;
pub mod search;
pub mod telemetry;
pub mod upstream;

/// Crate version, as published in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as published in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
