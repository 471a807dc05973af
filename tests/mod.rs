// Integration tests for panel-migrate

pub mod cli;
pub mod helpers;
