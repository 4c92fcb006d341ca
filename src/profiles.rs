//! Fixture profiles for the simulated BMC.

pub mod loader;
pub mod types;

pub use loader::load_fixture;
pub use types::{BmcFixture, FixtureSensor};
