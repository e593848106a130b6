//! Core tick engine.
//!
//! - `diff`: snapshot comparison
//! - `emitter`: one event per new record
//! - `dispatcher`: mode selection and the tick entry points

pub mod diff;
pub mod dispatcher;
pub mod emitter;
