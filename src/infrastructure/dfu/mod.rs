//! DFU Module
//!
//! USB firmware update transport.
//!
//! ## Modules
//!
//! - [`device`] - Backend traits implemented by the host USB stack
//! - [`protocol`] - DFU 1.1 states, status codes and response parsing
//! - [`transfer`] - Block upload/download loops and manifestation
//! - [`service`] - Update session: connect state machine and transfers

pub mod device;
pub mod protocol;
pub mod service;
pub mod transfer;

#[cfg(test)]
pub(crate) mod mock;

pub use service::DfuService;
