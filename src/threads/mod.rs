// SPDX-License-Identifier: MIT
//! Canonical 1:1 chat threads.
//!
//! A thread is keyed on the sorted pair of participant identities, not on a
//! task: the same two people share one conversation across every task they
//! ever exchange. Threads are created lazily on first contact and never
//! deleted.

pub mod model;
pub mod resolver;
pub mod storage;

pub use model::{pair_key, ChatThread};
pub use resolver::ThreadResolver;
pub use storage::ThreadStorage;
