pub mod ledger;
pub mod manual;
