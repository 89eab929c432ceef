//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nametag::prelude::*;
//! ```

pub use alloy::primitives::Address;

pub use crate::abi::{SlotError, SlotResult, decode_batch, encode_batch};
pub use crate::address::{parse_address, to_lower_hex};
pub use crate::cache::{CacheEntry, ResolutionCache};
pub use crate::config::{Config, ConfigIssue, HrefRuleConfig, IssueLevel};
pub use crate::cooldown::Cooldown;
pub use crate::error::{Error, Result};
pub use crate::extract::{AddressExtractor, HrefRule, validate_pattern};
pub use crate::name::Name;
pub use crate::resolver::{Outcome, Resolution, Resolver};
pub use crate::store::{InMemoryStore, JsonFileStore, KeyValueStore};
pub use crate::subject::{Subject, select_subject};
pub use crate::transport::{HttpTransport, Transport};
