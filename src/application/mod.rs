//! Application layer orchestrating the settlement flow.
//!
//! Provider event -> `webhook` (idempotent upsert, escrow classification) ->
//! `escrow` release (commission at the current rate) -> `ledger` credit ->
//! `payout` allocation and transfer. `engine::SettlementEngine` wires the
//! services over one set of stores.

pub mod engine;
pub mod escrow;
pub mod ledger;
mod notify;
pub mod payout;
pub mod settings;
pub mod webhook;
