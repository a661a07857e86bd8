/// Caller-supplied collaborators
pub mod collaborators;

/// Field binding contract
pub mod field_binding;

/// Form session facade
pub mod form_session;

/// Debounced and periodic autosave
pub mod persistence_manager;

/// Final validation and submission
pub mod submission_service;
