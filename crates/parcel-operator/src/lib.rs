//! Parcel operator: self-bootstrap state machine and controller wiring

#![deny(missing_docs)]

/// Self-bootstrap: installation detection, forced cleanup, revision repair
pub mod bootstrap;
/// Controller future construction
pub mod controller_runner;
/// CRD installation on startup
pub mod startup;
