pub mod errors;
pub mod money;
pub mod order;
pub mod progression;
