pub mod commands;
pub mod create_order;
pub mod order_service;
pub mod status_scheduler;
pub mod unit_of_work;
pub mod update_order_status;
