use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

pub const ENV_LISTEN_ADDRESS: &str = "SELFDNS_LISTEN_ADDRESS";
pub const ENV_SERVER_HOSTNAME: &str = "SELFDNS_SERVER_HOSTNAME";
pub const ENV_DNS_PORT: &str = "SELFDNS_DNS_PORT";
pub const ENV_API_BIND_ADDRESS: &str = "SELFDNS_API_BIND_ADDRESS";

pub const DEFAULT_DNS_PORT: u16 = 53;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,
    #[serde(default = "default_dns_port")]
    pub dns_port: u16,
    /// Name served as the NS target and SOA primary. Falls back to the machine hostname.
    #[serde(default)]
    pub server_hostname: Option<String>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub dns_tcp_timeout: Duration,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub api_timeout: Duration,
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_dns_port() -> u16 {
    DEFAULT_DNS_PORT
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_api_bind_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            dns_port: default_dns_port(),
            server_hostname: None,
            dns_tcp_timeout: default_timeout(),
            api_bind_addr: default_api_bind_addr(),
            api_timeout: default_timeout(),
        }
    }
}

impl Config {
    /// Load a JSON config file, resolving the server hostname if it was left unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] or [`Error::InvalidJSON`] if the file can't be read or parsed,
    /// [`Error::InsecureAPIBind`] for a public API bind address and [`Error::Hostname`] if the
    /// machine hostname is needed but unavailable.
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.finish()
    }

    /// Build a config from `SELFDNS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingEnv`] when `SELFDNS_LISTEN_ADDRESS` is unset and
    /// [`Error::InvalidListenAddress`] when an address or port can't be parsed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_address = var(ENV_LISTEN_ADDRESS).ok_or(Error::MissingEnv(ENV_LISTEN_ADDRESS))?;
        let mut conf = Config {
            listen_address: parse_listen_address(&listen_address)?,
            server_hostname: var(ENV_SERVER_HOSTNAME),
            ..Config::default()
        };
        if let Some(port) = var(ENV_DNS_PORT) {
            conf.dns_port = port
                .trim()
                .parse()
                .map_err(|_| Error::InvalidListenAddress(port))?;
        }
        if let Some(addr) = var(ENV_API_BIND_ADDRESS) {
            conf.api_bind_addr = addr
                .trim()
                .parse()
                .map_err(|_| Error::InvalidListenAddress(addr))?;
        }
        conf.finish()
    }

    /// The socket address both DNS listeners bind. IPv6 addresses render bracketed.
    #[must_use]
    pub fn dns_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.dns_port)
    }

    /// The configured server hostname. Always set on configs returned by
    /// [`Config::try_from_file`] or [`Config::from_env`].
    #[must_use]
    pub fn server_hostname(&self) -> &str {
        self.server_hostname.as_deref().unwrap_or_default()
    }

    fn finish(mut self) -> Result<Self, Error> {
        self.bind_addr_is_secure()?;
        if self.server_hostname.as_deref().map_or(true, str::is_empty) {
            let name = hostname::get().map_err(Error::Hostname)?;
            self.server_hostname = Some(name.to_string_lossy().into_owned());
        }
        Ok(self)
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}

/// Parse an IPv4 or IPv6 literal. IPv6 literals may already carry brackets.
fn parse_listen_address(raw: &str) -> Result<IpAddr, Error> {
    let trimmed = raw.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    IpAddr::from_str(unbracketed).map_err(|_| Error::InvalidListenAddress(raw.to_string()))
}
