/// Wiring of settings, stores and the delivery engine
pub mod app;
/// Mail transport clients
pub mod client;
/// Domain objects
pub mod domain;
/// The submission delivery engine
pub mod engine;
/// Error enums
pub mod error;
/// Data model
pub mod model;
/// Repositories
pub mod repo;
/// Application settings
pub mod settings;
/// Application telemetry for tracing and logging
pub mod telemetry;
/// E-mail template resolution and rendering
pub mod template;
