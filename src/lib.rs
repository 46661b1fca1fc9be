//! lockbox: console client for the INTERLOCK encrypted file appliance
//!
//! This library provides:
//! - The gateway: the sole JSON/HTTP channel to the appliance, with the
//!   response-envelope gate and the anti-forgery header
//! - The session layer: context, event classification, bounded log, and
//!   the status poller
//! - Dependency-ordered module bootstrap
//! - Thin feature modules for every endpoint family: files, keyring,
//!   LUKS volume passwords, clock sync, Signal messaging
//! - The interactive console that renders all of the above

pub mod app;
pub mod clock;
pub mod config;
pub mod console;
pub mod files;
pub mod gateway;
pub mod keyring;
pub mod luks;
pub mod messaging;
pub mod modules;
pub mod notify;
pub mod session;

pub use config::Config;
pub use gateway::{Gateway, GatewayError};
pub use session::{EventBus, SessionContext};
