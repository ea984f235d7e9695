//! Live registry of nearby BLE peripherals.
//!
//! The library scans for BLE devices, connects to every device it finds and
//! discovers all of its services and characteristics. The results are kept in
//! a [`Registry`] that tells its listeners whenever something changes, so a
//! display can redraw from the current state.
//!
//! ## Usage
//!
//! Print the device tree every time it changes:
//!
//! ```rust,no_run
//! use blexplorer::{Error, Explorer, ExplorerConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     pretty_env_logger::init();
//!
//!     let mut explorer = Explorer::new(ExplorerConfig::default());
//!     let mut changes = explorer.change_stream();
//!
//!     explorer.start().await?;
//!
//!     while let Some(snapshot) = changes.next().await {
//!         println!("{}", snapshot.radio_state());
//!         for device in snapshot.devices() {
//!             println!("  {} {}", device.id(), device.state());
//!         }
//!     }
//!
//!     Ok(())
//! }
//!```
//!
//! The [`Registry`] itself does not depend on btleplug. Anything that
//! implements [`RadioAdapter`] can drive it, which is also how it is tested.

#![warn(clippy::all, future_incompatible, nonstandard_style, rust_2018_idioms)]

pub use adapter::{AdapterEvent, Command, PowerState, RadioAdapter};
pub use characteristic::Characteristic;
pub use config::{ExplorerConfig, Rediscovery, RegistryConfig};
pub use device::{ConnectionState, Device, DeviceId};
pub use error::{Error, Result};
pub use explorer::{BtleplugAdapter, Explorer};
pub use registry::{RadioPhase, Registry, RegistryView, Snapshot};
pub use service::Service;

pub mod adapter;
mod config;
mod device;
mod error;
mod explorer;
mod registry;

mod characteristic;
pub mod common;
mod service;
