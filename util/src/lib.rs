pub mod config;
pub mod paths;
pub mod test_helpers;
