mod build_runner;
mod error;
mod watcher;
