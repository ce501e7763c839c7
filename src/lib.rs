//! rageblock: a local-first site blocker with self-acknowledged, expiring
//! bypasses, served to the browser extension over native messaging.

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod context;
pub mod db;
pub mod error;
pub mod history;
pub mod hostname;
pub mod interceptor;
pub mod models;
pub mod monitor;
pub mod native_host;
pub mod reflection;
pub mod sites;
pub mod store;
pub mod sweeper;
#[cfg(test)]
mod test_utils;
pub mod unblock;
pub mod validation;
