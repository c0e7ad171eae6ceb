//! Infrastructure configuration modules.

pub mod logging;
pub mod registry;
pub mod retry;
pub mod settings;
