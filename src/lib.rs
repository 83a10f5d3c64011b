pub mod config;
pub mod errors;
pub mod feedback;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod session;
pub mod stream;
pub mod ui;
