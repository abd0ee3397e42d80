#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod controller;
pub mod data;
pub mod debug;
pub mod feed;
pub mod library;
pub mod nav;
pub mod playback;
pub mod player;
pub mod session;
pub mod ui;
pub mod visibility;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
