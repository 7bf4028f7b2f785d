//! `grognon-server`: wires the Grognon subsystems together.
//!
//! [`app::AppState`] is the boundary used by presentation layers;
//! [`background`] drives the periodic connection maintenance tasks.

pub mod app;
pub mod background;

pub use app::AppState;
