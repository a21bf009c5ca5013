//! Adapters between the engine and the outside world: the JSONL operation
//! journal the binary replays, and the CSV account report it prints.

pub mod csv;
pub mod journal;
