// SPDX-License-Identifier: MIT
//! Task records and their repository.
//!
//! The marketplace at large owns task CRUD (posting forms, browsing,
//! payment); this module holds the slice the coordination core needs — the
//! status field, the creator/performer pair, and conditional writes that
//! keep the "performer is set exactly once" invariant.

pub mod model;
pub mod storage;

pub use model::{Task, TaskStatus, STATUS_FLOW};
pub use storage::TaskStorage;
