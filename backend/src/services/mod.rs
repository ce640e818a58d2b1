pub mod clock;
pub mod power_consumer;
pub mod power_consumers_service;
pub mod price_sources;
pub mod price_sync;
pub mod price_window;
pub mod schedule_computation;
pub mod scheduler;
pub mod switch_actions;
