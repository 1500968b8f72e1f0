//! Interactive terminal demo: a host application behind the storage gate,
//! running against the simulated OS.

mod app;
mod ui;

pub use app::{App, DemoOptions, View, run_demo};
