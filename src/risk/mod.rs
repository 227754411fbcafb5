pub mod progression;
pub mod risk_manager;
pub mod sizing;
