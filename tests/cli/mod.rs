/// End-to-end CLI tests exercising the actual binary with assert_cmd.
///
/// None of these need a running MySQL server: they cover argument handling,
/// configuration errors, and the release check against a local cache file.
pub mod error_handling;
pub mod help;
pub mod release;
