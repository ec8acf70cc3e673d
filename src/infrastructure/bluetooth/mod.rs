//! Bluetooth Module
//!
//! Wireless transport to the controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │   (session: connect/disconnect, reads, input/camera)     │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌───────────┐
//! │ Connection│  │ Scheduler  │  │  Adapter  │
//! │           │  │            │  │           │
//! │ - picker  │  │ - FIFO     │  │ - backend │
//! │ - service │  │ - retry in │  │   traits  │
//! │   map     │  │   place    │  │           │
//! └───────────┘  └────────────┘  └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`adapter`] - Backend traits implemented by the host Bluetooth stack
//! - [`connection`] - Device selection, link setup and capability discovery
//! - [`scheduler`] - Serialized write queue with bounded retry
//! - [`service`] - Session coordinator

pub mod adapter;
pub mod connection;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod mock;

pub use service::BluetoothService;
