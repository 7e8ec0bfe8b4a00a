// Library root: exposes the app modules so integration tests can drive a
// full run without going through the binary.

pub mod config;
pub mod db;
pub mod pipeline;
