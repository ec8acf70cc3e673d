//! Transport-independent model: device identity, input encoding, settings
//! and the release catalog.

pub mod input;
pub mod models;
pub mod releases;
pub mod settings;
