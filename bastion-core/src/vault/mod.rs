//! Vault lifecycle, key hierarchy, settings, and legacy migration.

mod migrate;
pub mod salt;
mod service;
mod settings;

pub use service::{Vault, VaultState, VERIFY_MARKER};
pub use settings::VaultSettings;
