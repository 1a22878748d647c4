//! Capture, export, push and import.
//!
//! ```text
//! transcripts ─capture─▶ store (exported = false)
//!                           │ export
//!                           ▼
//!              rekal/<email>: dict.bin + rekal.body ─push─▶ remote
//!                           ▲
//!             remote branches ─import─▶ store (exported = true)
//! ```

pub mod capture;
pub mod export;
pub mod import;
pub mod push;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use capture::capture;
pub use export::{export, is_wire_limit, ExportOutcome};
pub use import::{import_remote_branches, import_wire, ImportStats};
pub use push::{is_conflict, push, PushError, PushOutcome};
pub use wire::{branch_name, branch_ref, init_branch, WireState, BODY_FILE, DICT_FILE};
