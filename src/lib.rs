#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod auth;
pub mod config;
pub mod data;
pub mod debug;
pub mod event;
pub mod feed;
pub mod menu;
pub mod parser;
pub mod process;
pub mod state;
pub mod storage;
pub mod sync;
pub mod text;
pub mod ui;
pub mod video;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
