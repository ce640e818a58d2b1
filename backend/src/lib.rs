//! Smart Power Consumer Library
//!
//! Schedules when switchable loads (EV chargers, smart plugs) should draw power
//! so that a requested amount of consumption lands in the cheapest price
//! intervals before a deadline, then drives the devices through Home Assistant:
//! - Day-level price sources (W12 two-zone tariff, flat G11 rate) with caching
//! - Cheapest-interval selection and ON/OFF switch-action synthesis
//! - Timer-based execution and cancellation of consumption plans
//! - HTTP API for consumers, plans and price lists

pub mod api;
pub mod config;
pub mod errors;
pub mod integrations;
pub mod models;
pub mod services;

#[cfg(test)]
mod test_support;
