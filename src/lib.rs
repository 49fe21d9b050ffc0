//! Core library for the Multimaze Recorder.
//!
//! This library implements the metadata and folder-lifecycle model behind the
//! behavioral recording rig: the experiment-type registry, named metadata
//! templates, the per-folder variable/value table with its editing binding,
//! the on-disk folder state machine, and the recording worker boundary. A
//! GUI binds to [`session::Session`]; the `multimaze` binary drives the same
//! surface from the command line.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod folder;
mod fsio;
pub mod layout;
pub mod metadata;
pub mod registry;
pub mod session;
pub mod table;
pub mod template;
