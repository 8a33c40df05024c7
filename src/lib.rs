//! selfdns
//!
//! A self-hosted authoritative DNS responder for [RFC-8555][RFC-8555] [DNS-01] challenges.
//!
//! Instead of publishing challenge records through a DNS hosting provider's API, the ACME client
//! runs this tiny server, delegates the `_acme-challenge` names to it, and lets the CA query it
//! directly. Listeners are only bound while at least one challenge is outstanding.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod error;
pub mod provider;
pub mod record_store;

pub use challenge::{challenge_record, ChallengeRecord};
pub use config::{Config, SharedConfig};
pub use dns::DnsServer;
pub use provider::{DynProvider, Provider, SelfDnsProvider};
pub use record_store::InMemoryRecordStore;
