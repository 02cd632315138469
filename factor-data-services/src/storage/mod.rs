pub mod file_store;

pub use file_store::{file_timestamp, safe_file_stem, DataStore};
