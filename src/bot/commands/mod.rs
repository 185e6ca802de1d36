pub mod reports;
pub mod reset;
pub mod status;
