//! HID Module
//!
//! Provisioning transport: the controller in its HID mode accepts
//! provisioning data as a sequence of feature reports.
//!
//! ## Modules
//!
//! - [`device`] - Backend traits implemented by the host HID stack
//! - [`protocol`] - Report ids, chunking and the commit magic
//! - [`service`] - Provisioning session

pub mod device;
pub mod protocol;
pub mod service;

#[cfg(test)]
pub(crate) mod mock;

pub use service::HidService;
