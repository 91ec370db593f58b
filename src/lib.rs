//! Media backup workspace façade.
//!
//! Re-exports the backup pipeline together with the runtime and bridge crates
//! so hosts can depend on a single package.

pub use bridge_traits;
pub use core_backup::*;
pub use core_runtime;
