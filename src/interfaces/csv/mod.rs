//! CSV adapters used by the command-line driver.

pub mod catalog_reader;
pub mod command_reader;
pub mod entry_writer;
