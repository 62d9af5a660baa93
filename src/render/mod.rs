//! Render module - UI components for the loop view

mod loop_bar;

pub use loop_bar::{BarClick, LoopBar};
