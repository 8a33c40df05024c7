//! HTTP API for presenting and cleaning up DNS-01 challenges.
//!
//! Lets an ACME client running in another process drive the
//! [provider][crate::provider::SelfDnsProvider]. The API binds a loopback or private address
//! only; see [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`].
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!   Returns HTTP 503 (Service Unavailable) if a DNS listener exited while records were still
//!   published.
//!
//! ## `/timeout` (GET)
//!
//!   Returns how long (`timeout`) and how often (`interval`) to poll for the challenge record,
//!   in seconds:
//!
//!   ```json
//!   { "timeout": 120, "interval": 2 }
//!   ```
//!
//! ## `/present` (POST)
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   { "domain": "example.com", "token": "XXXX", "key_auth": "XXXX.YYYY" }
//!   ```
//!
//!  Where `key_auth` is the [RFC-8555][RFC-8555] key authorization for `token`. The DNS
//!  listeners are started if this is the first outstanding challenge.
//!
//!  For successful updates, returns HTTP 200 (OK) and a JSON response body of the form:
//!
//!  ```json
//!  { "fqdn": "_acme-challenge.example.com.", "value": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!  ```
//!
//! ## `/cleanup` (POST)
//!
//!  Takes the same body as `/present` and retires the record again. Once no challenges are
//!  outstanding the DNS listeners are stopped. Cleaning up a challenge that was never presented
//!  succeeds.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
