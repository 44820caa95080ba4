//! Processors bundled with the controller.

pub mod environment;

pub use environment::EnvironmentProcessor;
