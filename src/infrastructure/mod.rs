//! Transport sessions and the shared pieces they report to.

pub mod bluetooth;
pub mod capabilities;
pub mod dfu;
pub mod hid;
pub mod logging;
pub mod notifier;
pub mod registry;
pub mod release_fetcher;
