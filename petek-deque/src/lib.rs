//! Double-ended queues for the petek family.
//!
//! ## Features
//!
//! - `ArrayDeque`: bounded wait-free MPMC deque over a slot ring.
//! - `Deque`: unbounded lock-free deque with cooperative growth.
//!
//! ## Usage
//!
//! ```rust
//! use petek_deque::Deque;
//!
//! let deque = Deque::new(2);
//! deque.add_back(1);
//! deque.add_back(2);
//! deque.add_back(3); // grows the ring, never fails
//! assert_eq!(deque.len(), 3);
//! ```

#![warn(missing_docs)]

pub mod array_deque;
pub mod deque;

pub use array_deque::ArrayDeque;
pub use deque::Deque;
