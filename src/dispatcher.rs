mod daemon;
mod execution;

pub use daemon::Dispatcher;
