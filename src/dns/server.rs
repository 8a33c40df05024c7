use crate::config::Config;
use crate::dns::handler::Handler;
use crate::dns::Transport;
use crate::error::{Error, TransportError};
use crate::record_store::DynRecordStore;
use std::future::Future;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

/// Pause before retrying after a failed receive or accept.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Running UDP and TCP listeners answering from a shared [record store][crate::record_store].
///
/// Each transport is served by its own task, so one failing doesn't take the other down and
/// [`DnsServer::stop`] can report on both. Dropping a `DnsServer` without calling
/// [`DnsServer::stop`] still signals both listeners to shut down.
pub struct DnsServer {
    udp: Listener,
    tcp: Listener,
}

struct Listener {
    transport: Transport,
    addr: SocketAddr,
    shutdown: CancellationToken,
    _shutdown_on_drop: DropGuard,
    task: JoinHandle<()>,
}

impl DnsServer {
    /// Bind the UDP socket and TCP listener on [`Config::dns_bind_addr`] and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if either transport can't be bound. Nothing is left listening in
    /// that case.
    pub async fn start(config: &Config, store: DynRecordStore) -> Result<Self, Error> {
        let bind_addr = config.dns_bind_addr();
        let udp_socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| Error::Bind {
                transport: Transport::Udp,
                addr: bind_addr,
                source,
            })?;
        let tcp_listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| Error::Bind {
                transport: Transport::Tcp,
                addr: bind_addr,
                source,
            })?;
        let udp_addr = udp_socket.local_addr()?;
        let tcp_addr = tcp_listener.local_addr()?;

        let handler = Handler::new(store);
        let idle_timeout = config.dns_tcp_timeout;
        let udp = Listener::spawn(Transport::Udp, udp_addr, {
            let handler = handler.clone();
            move |shutdown| serve_udp(udp_socket, handler, shutdown)
        });
        let tcp = Listener::spawn(Transport::Tcp, tcp_addr, move |shutdown| {
            serve_tcp(tcp_listener, handler, idle_timeout, shutdown)
        });

        info!("DNS listening on UDP {udp_addr}");
        info!("DNS listening on TCP {tcp_addr}");
        Ok(DnsServer { udp, tcp })
    }

    /// Shut down both listeners, waiting for in-flight requests to be answered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] listing every transport that failed, either while running or
    /// while shutting down. A failure on one transport never skips the other.
    pub async fn stop(self) -> Result<(), Error> {
        let (udp, tcp) = tokio::join!(self.udp.stop(), self.tcp.stop());
        let errors: Vec<TransportError> = [udp, tcp].into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            info!("DNS listeners stopped");
            Ok(())
        } else {
            Err(Error::Shutdown(errors))
        }
    }

    /// Transports whose listener exited on its own, without being stopped.
    #[must_use]
    pub fn failed_transports(&self) -> Vec<Transport> {
        [&self.udp, &self.tcp]
            .into_iter()
            .filter(|listener| listener.failed())
            .map(|listener| listener.transport)
            .collect()
    }

    #[must_use]
    pub fn udp_addr(&self) -> SocketAddr {
        self.udp.addr
    }

    #[must_use]
    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp.addr
    }
}

impl Listener {
    fn spawn<F, Fut>(transport: Transport, addr: SocketAddr, serve: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(serve(shutdown.clone()));
        Listener {
            transport,
            addr,
            _shutdown_on_drop: shutdown.clone().drop_guard(),
            shutdown,
            task,
        }
    }

    async fn stop(self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        let Err(err) = self.task.await else {
            return Ok(());
        };
        let message = err.to_string();
        error!("DNS {} listener on {} failed: {message}", self.transport, self.addr);
        Err(TransportError {
            transport: self.transport,
            message,
        })
    }

    fn failed(&self) -> bool {
        self.task.is_finished() && !self.shutdown.is_cancelled()
    }
}

/// Answer datagrams until `shutdown`, then wait for the replies already being worked on.
async fn serve_udp(socket: UdpSocket, handler: Handler, shutdown: CancellationToken) {
    let socket = Arc::new(socket);
    let mut inflight = JoinSet::new();
    let mut buf = vec![0u8; usize::from(u16::MAX)];

    loop {
        let (n, src) = tokio::select! {
            () = shutdown.cancelled() => break,
            Some(_) = inflight.join_next(), if !inflight.is_empty() => continue,
            res = socket.recv_from(&mut buf) => match res {
                Ok(r) => r,
                Err(err) => {
                    error!("DNS UDP receive error: {err}");
                    time::sleep(RETRY_DELAY).await;
                    continue;
                }
            },
        };

        let packet = buf[..n].to_vec();
        let (socket, handler) = (socket.clone(), handler.clone());
        inflight.spawn(async move {
            let Some(reply) = handler.handle_packet(&packet, src, Transport::Udp).await else {
                return;
            };
            if let Err(err) = socket.send_to(&reply, src).await {
                debug!("DNS UDP send to {src} failed: {err}");
            }
        });
    }

    while inflight.join_next().await.is_some() {}
}

/// Accept connections until `shutdown`, then close the listener and let open connections finish
/// the message they're on.
async fn serve_tcp(
    listener: TcpListener,
    handler: Handler,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        let (stream, peer) = tokio::select! {
            () = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            res = listener.accept() => match res {
                Ok(r) => r,
                Err(err) => {
                    error!("DNS TCP accept error: {err}");
                    time::sleep(RETRY_DELAY).await;
                    continue;
                }
            },
        };

        let (handler, shutdown) = (handler.clone(), shutdown.clone());
        connections.spawn(async move {
            if let Err(err) = serve_connection(stream, peer, &handler, idle_timeout, &shutdown).await
            {
                debug!("DNS TCP connection from {peer} failed: {err}");
            }
        });
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

/// Answer length-prefixed messages on one connection until the peer closes it, it idles for
/// `idle_timeout`, or `shutdown` fires between messages.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: &Handler,
    idle_timeout: Duration,
    shutdown: &CancellationToken,
) -> io::Result<()> {
    let mut len_buf = [0u8; 2];
    loop {
        let read = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            read = time::timeout(idle_timeout, stream.read_exact(&mut len_buf)) => read,
        };
        match read {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                debug!("closing idle DNS TCP connection from {peer}");
                return Ok(());
            }
        }

        let mut packet = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
        time::timeout(idle_timeout, stream.read_exact(&mut packet)).await??;

        // Malformed messages end the connection.
        let Some(reply) = handler.handle_packet(&packet, peer, Transport::Tcp).await else {
            return Ok(());
        };
        let len = u16::try_from(reply.len())
            .map_err(|_| io::Error::new(ErrorKind::InvalidData, "DNS response over 65535 bytes"))?;
        let mut framed = Vec::with_capacity(reply.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&reply);
        stream.write_all(&framed).await?;
    }
}
