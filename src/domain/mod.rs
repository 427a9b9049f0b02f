//! Domain layer - pure types and rules with no I/O.
//!
//! - `foundation` - identifiers, timestamps, validation errors, state machine trait
//! - `gateway` - credential validation, session lifecycle, wire protocol

pub mod foundation;
pub mod gateway;
