//! Authoritative DNS responder for challenge records.
//!
//! # Challenge TXT Records
//!
//! selfdns serves a response to `TXT` class queries for every FQDN that has at least one
//! [RFC-8555][RFC-8555] [DNS-01] proof value in the [record store][crate::record_store]. Each
//! stored value becomes one answer, in publication order.
//!
//! E.g. after presenting a challenge for `example.com`, a `TXT` class query returns:
//!
//! ```bash
//! ❯ dig @127.0.0.1 +short _acme-challenge.example.com TXT
//! "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"
//! ```
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
//! # Synthesized Records
//!
//! `NS` and `SOA` answers are synthesized for the same FQDNs from the server hostname the record
//! was created with ([`Config::server_hostname`][`crate::config::Config::server_hostname`]).
//!
//! ## NS
//!
//! ```bash
//! ❯ dig @127.0.0.1 +short _acme-challenge.example.com NS
//! ns1.example.com.
//! ```
//!
//! ## SOA
//!
//! ```bash
//! ❯ dig @127.0.0.1 +short _acme-challenge.example.com SOA
//! ns1.example.com. admin.ns1.example.com. 1700000000 10 10 10 10
//! ```
//!
//! _Note: The zone serial is the Unix time of the query, so it changes every second._
//!
//! Names without a stored record, and every other record type, get an empty answer section.
//! All answers carry a TTL of 10 seconds.
//!
//! # Lifecycle
//!
//! The listeners only run while there is something to answer. [`server::DnsServer`] binds one UDP
//! socket and one TCP listener, and is started and stopped by the
//! [provider][crate::provider::SelfDnsProvider] as the record store fills and empties.
//!
//! Every question of a message is answered, and replies are written without name compression.
//! UDP replies that don't fit the client's payload size come back truncated so it retries over
//! TCP.

use std::fmt;

pub mod handler;
pub mod server;

pub use handler::Handler;
pub use server::DnsServer;

/// The transports the DNS server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("UDP"),
            Transport::Tcp => f.write_str("TCP"),
        }
    }
}
