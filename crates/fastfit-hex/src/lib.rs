//! fastfit-hex: order lifecycle core (use cases, unit of work, status scheduler)
//! plus the inbound HTTP adapter.

pub mod config;
pub mod errors;

pub mod application;

pub use fastfit_types::{domain, ports};

pub mod inbound; // HTTP adapter (server + handlers)
