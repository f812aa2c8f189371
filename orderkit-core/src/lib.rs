#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Session and offline-cache synchronization core for OrderKit clients.
//!
//! The crate owns the bearer credential lifecycle ([`session::SessionManager`],
//! [`storage::CredentialStore`]), the on-device cart and notification caches
//! ([`storage::CartCache`], [`storage::NotificationCache`]) and the push
//! registration bookkeeping tied to a session ([`push::PushRegistrationCoordinator`]).
use strum::EnumString;

/// Backend deployment the SDK talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Staging backend.
    Staging,
    /// Production backend.
    Production,
}

mod error;
pub use error::*;

pub mod defaults;
pub use defaults::SessionConfig;

pub mod backend;
pub mod identity;
/// Logging bridge to the host application.
pub mod logger;
pub mod push;
pub mod session;
pub mod storage;

// private modules
mod http_request;

#[cfg(test)]
mod test_support;

uniffi::setup_scaffolding!("orderkit_core");
