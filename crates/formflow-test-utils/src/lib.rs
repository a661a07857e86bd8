//! Testing utilities for formflow.
//!
//! Fixtures (sample form definitions), `mockall` mocks and recording fakes of
//! the collaborator traits, a deterministic timer driver, a session harness
//! wiring them together, and assertion helpers.

pub mod assertions;
pub mod driver;
pub mod fixtures;
pub mod harness;
pub mod logging;
pub mod mocks;
pub mod recorders;

/// Re-export commonly used types for convenience
pub use mockall;

pub use driver::TimerDriver;
pub use harness::SessionHarness;
pub use logging::init_test_logging;
