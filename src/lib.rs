//! Saunalink - LAN control client for Tuya-derived sauna controllers
//!
//! This library speaks the controller's proprietary binary frame protocol
//! directly over TCP: AES-128-ECB encrypted JSON payloads inside
//! CRC32-protected `55AA` frames. It is written for constrained deployments
//! where no system crypto or socket library is available, so the cipher and
//! checksum are implemented from scratch.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use saunalink::SaunaController;
//!
//! let mut sauna = SaunaController::new();
//! sauna.configure("192.168.1.40", "fdjhl1jhlkjh4ljk", "bf735huj9kf2lda4x1", "");
//!
//! if sauna.poll_snapshot() {
//!     println!("heater on: {}", sauna.heater_on_fb());
//!     println!("setpoint:  {}", sauna.setpoint());
//! }
//! sauna.set_setpoint(80);
//! ```
//!
//! # Layering
//!
//! - [`crypto`] - hand-written AES-128-ECB with PKCS#7, and IEEE CRC32
//! - [`protocol`] - frame build/scan over the `55AA ... AA55` wire format
//! - [`dps`] - targeted field extraction from decrypted DP snapshots
//! - [`transport`] - blocking TCP connection seam
//! - [`client`] - per-operation protocol state machine (poll, write)
//! - [`controller`] - non-throwing facade with verification and backoff

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod client;
pub mod controller;
pub mod crypto;
pub mod dps;
pub mod protocol;
pub mod transport;

pub use client::{Client, ClientError, SessionConfig};
pub use controller::SaunaController;
pub use dps::Snapshot;
pub use transport::{Connection, Connector, TcpConnector, TransportError};

/// Default TCP port for the LAN protocol.
pub const DEFAULT_PORT: u16 = 6668;
