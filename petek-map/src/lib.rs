//! Wait-free fixed-capacity hash table for the petek family.
//!
//! ## Features
//!
//! - `HashBucket`: open-addressed hash table over a slot bucket, with
//!   caller-driven probing. Every operation does bounded work.
//!
//! ## Usage
//!
//! ```rust
//! use petek_map::HashBucket;
//!
//! let map = HashBucket::new(16);
//! assert!(map.add(1, "one", 0).is_ok());
//! assert_eq!(map.get(&1, 0), Some("one"));
//! assert!(map.remove(&1, 0).is_some());
//! ```

#![warn(missing_docs)]

pub mod hash_bucket;

pub use hash_bucket::{AddError, HashBucket, Iter, Keys, Set, Values};
