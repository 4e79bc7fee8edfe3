//! Hierarchical configuration for small tools. TOML or JSON files are loaded
//! into a tree of attribute Nodes that callers read and grow at runtime, and
//! the whole tree is persisted as authenticated ciphertext next to a local key.

pub mod config;
pub mod crypto;
pub mod format;
pub mod node;
pub mod paths;
pub mod store;
pub mod transcode;

pub use config::StoreConfig;
pub use node::{Attributes, Node, Value};
pub use store::{Store, StoreError};
