pub mod client;
pub mod project;
pub mod time_entry;
