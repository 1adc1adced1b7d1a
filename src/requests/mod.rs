// src/requests/mod.rs
//! Buyer "request a quote" flow and its ledger.

pub mod code;
pub mod ledger;
pub mod workflow;

pub use workflow::RequestWorkflow;
