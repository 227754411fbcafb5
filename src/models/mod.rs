pub mod bankroll;
pub mod block;
pub mod rule;
pub mod task;
pub mod wager;
