pub mod import;
pub mod media;
pub mod search;
pub mod status;
pub mod tags;
pub mod types;
