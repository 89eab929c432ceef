//! Nametag - reverse name resolution for Ethereum addresses
//!
//! This crate turns addresses found on web pages into human-readable names
//! registered on-chain. It provides:
//!
//! - An ABI codec for one batched `aggregate3` call of `reverseResolve`
//!   lookups, decoded slot by slot
//! - Address extraction from links and labels, with a backtracking lint for
//!   user-supplied patterns
//! - Subject selection when a link mentions more than one address
//! - A TTL cache with negative entries, and a chunking, rate-limited resolver
//!
//! Storage and network access sit behind the [`KeyValueStore`] and
//! [`Transport`] traits; [`InMemoryStore`], [`JsonFileStore`] and
//! [`HttpTransport`] are the bundled implementations.

pub mod abi;
pub mod address;
pub mod cache;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod extract;
pub mod name;
pub mod prelude;
pub mod resolver;
pub mod store;
pub mod subject;
pub mod transport;
pub mod util;

pub use alloy::primitives::Address;
pub use config::Config;
pub use error::{Error, Result};
pub use name::Name;
pub use resolver::{Outcome, Resolution, Resolver};
pub use store::{InMemoryStore, JsonFileStore, KeyValueStore};
pub use transport::{HttpTransport, Transport};
