//! Bluetooth Module
//!
//! Drives a Parrot MiniDrone over BLE.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      DroneSession                        │
//! │   (lifecycle, drive loop, queued commands, status)       │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │ Transport │  │  Protocol  │  │  Status  │
//! │           │  │            │  │          │
//! │ - connect │  │ - UUIDs    │  │ - flight │
//! │ - notify  │  │ - frames   │  │ - battery│
//! │ - write   │  │ - sequence │  │          │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, commands and frame encoding
//! - [`sequence`] - Per-characteristic sequence numbers
//! - [`status`] - Flight and battery notification parsing
//! - [`transport`] - BLE capability the session is written against
//! - [`mock`] - In-memory transport
//! - [`session`] - Session coordinator

pub mod mock;
pub mod protocol;
pub mod sequence;
pub mod session;
pub mod status;
pub mod transport;

pub use mock::MockTransport;
pub use session::DroneSession;
pub use transport::Transport;
