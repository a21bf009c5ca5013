pub mod reader;
pub mod runner;
