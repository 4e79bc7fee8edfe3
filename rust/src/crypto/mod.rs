//! Cryptography used by the store: the authenticated vault that seals the
//! persisted configuration and the digest used to fingerprint it.

pub mod integrity;
pub mod secrets;
