pub mod alerts;
pub mod pnl;
