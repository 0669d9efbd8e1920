pub mod clock;
pub mod order_read;
pub mod order_repository;
pub mod status_jobs;
