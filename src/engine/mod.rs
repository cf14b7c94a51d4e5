// src/engine/mod.rs

//! Question selection, session state and scoring.

pub mod clock;
pub mod launch;
pub mod registry;
pub mod scoring;
pub mod selection;
pub mod session;
