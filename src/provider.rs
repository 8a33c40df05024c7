//! The DNS-01 challenge provider.
//!
//! [`SelfDnsProvider`] publishes challenge records in its own [record store][crate::record_store]
//! and runs the [DNS server][crate::dns] for exactly as long as the store is non-empty: the first
//! [`Provider::present`] binds the listeners, and the [`Provider::clean_up`] that retires the last
//! value shuts them down again.

use crate::challenge::{challenge_record, ChallengeRecord};
use crate::config::SharedConfig;
use crate::dns::{DnsServer, Transport};
use crate::error::Error;
use crate::record_store::{DynRecordStore, InMemoryRecordStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// How long an ACME client should wait for the challenge record to become visible.
pub const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(120);

/// How often an ACME client should check for the challenge record.
pub const POLLING_INTERVAL: Duration = Duration::from_secs(2);

/// `DynProvider` is a type alias for a [`Provider`] shared between the
/// [HTTP API][crate::api] handlers.
pub type DynProvider = Arc<dyn Provider + Send + Sync>;

/// The operations an ACME client drives to solve a DNS-01 challenge.
#[async_trait::async_trait]
pub trait Provider {
    /// Publish the challenge record for `domain` and make sure it's being served.
    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<ChallengeRecord, Error>;

    /// Retire the challenge record for `domain`, stopping the server once nothing is left.
    async fn clean_up(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<ChallengeRecord, Error>;

    /// How long, and how often, to poll for the record once presented.
    fn timeout(&self) -> (Duration, Duration) {
        (PROPAGATION_TIMEOUT, POLLING_INTERVAL)
    }

    /// Transports whose listener died while it should have been running.
    async fn failed_transports(&self) -> Vec<Transport>;
}

/// A [`Provider`] that answers the challenge queries itself.
pub struct SelfDnsProvider {
    config: SharedConfig,
    store: DynRecordStore,
    // Held across every store mutation that can start or stop the server.
    server: Mutex<Option<DnsServer>>,
}

impl SelfDnsProvider {
    #[must_use]
    pub fn new(config: SharedConfig) -> Self {
        SelfDnsProvider {
            config,
            store: Arc::new(RwLock::new(InMemoryRecordStore::default())),
            server: Mutex::new(None),
        }
    }

    /// Publish `value` for `fqdn`, starting the DNS server if it isn't running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the server had to be started and couldn't bind. The value is
    /// not kept in that case.
    pub async fn add_value(&self, fqdn: &str, value: &str) -> Result<(), Error> {
        let mut server = self.server.lock().await;
        self.store
            .write()
            .await
            .add_value(fqdn, self.config.server_hostname(), value.to_string());
        info!("published TXT record for \"{fqdn}\"");

        if server.is_none() {
            match DnsServer::start(&self.config, self.store.clone()).await {
                Ok(started) => *server = Some(started),
                Err(err) => {
                    self.store.write().await.remove_value(fqdn, value);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Retire `value` for `fqdn`, stopping the DNS server if no records remain. Retiring a value
    /// that isn't published does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if stopping the server failed. The server is considered
    /// stopped regardless.
    pub async fn remove_value(&self, fqdn: &str, value: &str) -> Result<(), Error> {
        let mut server = self.server.lock().await;
        let now_empty = {
            let mut store = self.store.write().await;
            if store.remove_value(fqdn, value) {
                info!("retired TXT record for \"{fqdn}\"");
            } else {
                debug!("no TXT record to retire for \"{fqdn}\"");
            }
            store.is_empty()
        };

        if now_empty {
            if let Some(running) = server.take() {
                running.stop().await?;
            }
        }
        Ok(())
    }

    /// Stop the DNS server if it's running. Published records are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] if stopping the server failed.
    pub async fn shutdown(&self) -> Result<(), Error> {
        match self.server.lock().await.take() {
            Some(running) => running.stop().await,
            None => Ok(()),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.server.lock().await.is_some()
    }

    /// The bound `(udp, tcp)` addresses while the server is running.
    pub async fn local_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.server
            .lock()
            .await
            .as_ref()
            .map(|running| (running.udp_addr(), running.tcp_addr()))
    }

    #[must_use]
    pub fn store(&self) -> &DynRecordStore {
        &self.store
    }
}

#[async_trait::async_trait]
impl Provider for SelfDnsProvider {
    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<ChallengeRecord, Error> {
        let record = challenge_record(domain, key_auth);
        self.add_value(&record.fqdn, &record.value).await?;
        Ok(record)
    }

    async fn clean_up(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<ChallengeRecord, Error> {
        let record = challenge_record(domain, key_auth);
        self.remove_value(&record.fqdn, &record.value).await?;
        Ok(record)
    }

    async fn failed_transports(&self) -> Vec<Transport> {
        self.server
            .lock()
            .await
            .as_ref()
            .map_or_else(Vec::new, DnsServer::failed_transports)
    }
}
