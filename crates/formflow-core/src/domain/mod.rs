/// Visibility conditions
pub mod condition;

/// Domain events
pub mod events;

/// Form, step and field definitions
pub mod form_definition;

/// Repository interfaces
pub mod repository;

/// Persisted snapshot record
pub mod snapshot;

/// Step state machine
pub mod step_controller;

/// Timer scheduling
pub mod timer;

/// Schema contract and field rules
pub mod validation;

/// Step and field visibility
pub mod visibility;
