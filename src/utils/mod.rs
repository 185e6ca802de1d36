pub mod classifier;
pub mod format;
pub mod time;
pub mod tracker;
