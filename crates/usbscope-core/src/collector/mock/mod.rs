//! Mock filesystem and fixtures for enumerator tests.

mod filesystem;
mod scenarios;

pub use filesystem::{MockFs, UsbFixture};
