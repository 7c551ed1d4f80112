#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod exit_status;
pub mod jobs;
pub mod observability;
pub mod pool;
pub mod queue;
pub mod registry;
