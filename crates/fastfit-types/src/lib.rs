//! fastfit-types: order domain model and the ports the adapters implement.

pub mod domain;
pub mod ports;
