//! Petek: wait-free slot and bucket primitives for concurrent containers.
//!
//! This crate is the storage layer of the petek family. It provides a single
//! concurrent cell ([`Slot`]) and a fixed-capacity array of cells with an
//! accurate live count ([`Bucket`]). The hash table (`petek-map`) and the
//! deques (`petek-deque`) are built directly on these primitives.
//!
//! ## Features
//!
//! - **Single-CAS transitions**: every slot change linearizes at one
//!   compare-and-swap; lost races are reported, never retried internally.
//! - **Epoch reclamation**: values are published behind
//!   [`crossbeam_epoch`] pointers, so readers never observe freed memory.
//! - **Accurate counts**: the bucket's live count is eventually consistent
//!   with its slots and bounded by `0..=capacity` at all times.
//!
//! ## Usage
//!
//! ```rust
//! use petek::Bucket;
//!
//! let bucket = Bucket::new(8);
//! assert!(bucket.insert(0, "a").is_ok());
//! assert_eq!(bucket.try_get(0), Some("a"));
//! assert_eq!(bucket.remove(0), Some("a"));
//! assert!(bucket.is_empty());
//! ```

#![warn(missing_docs)]

pub mod bucket;
pub mod slot;
pub mod utils;

pub use bucket::{Bucket, Iter, Occupied};
pub use slot::Slot;
pub use utils::CacheAligned;
