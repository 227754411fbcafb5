pub mod predictor;
pub mod streak;
