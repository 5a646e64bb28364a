//! murmur: SWIM-style cluster membership.
//!
//! The protocol core lives in [`membership`], [`dissemination`] and
//! [`gossip`]; it is driven by explicit time and never blocks. [`protocol`],
//! [`transport`], [`node`] and [`api`] run it over UDP with tokio and serve
//! the local view over HTTP.
#[macro_use]
pub mod error;

pub mod api;
pub mod cli;
pub mod dissemination;
pub mod gossip;
pub mod membership;
pub mod node;
pub mod protocol;
pub mod settings;
pub mod transport;
