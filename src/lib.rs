//! Controller Link
//!
//! Communication and firmware transfer engine for the controller: a GATT
//! session for identity, input and camera control, a USB DFU session for
//! firmware reads and writes, and a HID session for provisioning.
//!
//! ```text
//!                    ┌──────────────┐
//!                    │ DeviceEngine │── ReleaseCatalog
//!                    └──────┬───────┘
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//! BluetoothService      DfuService         HidService
//!   (scheduler)      (detach/reset)     (feature reports)
//!        └──────────► SessionRegistry ◄────────┘
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod infrastructure;

pub use engine::{Backends, DeviceEngine};
pub use error::{DeviceError, DeviceResult, TransportError};
pub use infrastructure::bluetooth::BluetoothService;
pub use infrastructure::dfu::DfuService;
pub use infrastructure::hid::HidService;
pub use infrastructure::notifier::{ChannelNotifier, LogNotifier, Notifier};
pub use infrastructure::registry::{RegistrySnapshot, SessionRegistry};
