//! Domain types and the ports the application layer depends on.

pub mod account;
pub mod audit;
pub mod collaborators;
pub mod commission;
pub mod event;
pub mod money;
pub mod payment;
pub mod payout;
pub mod ports;
pub mod settings;
