pub mod app;
pub mod scheduler;
pub mod telemetry;
