pub mod app;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod eqn;
pub mod error;
pub mod render;
pub mod runtime;
pub mod scheduler;
pub mod terminal;
pub mod visual;
