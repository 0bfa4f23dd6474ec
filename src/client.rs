use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{is_timeout_kind, ClientError};
use crate::request::{build_get_request, build_request_target};
use crate::response::{read_head, Response};
use crate::safety::parse_allowed;

// Bound on connect, each read and each write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/*
A socket owned by exactly one request.

Plain is used for http://, Tls for https://. Dropping a Connection shuts the socket down
(sending a TLS close_notify first), so every path out of a request releases it.
*/
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Connection {
    fn socket(&self) -> &TcpStream {
        match self {
            Connection::Plain(stream) => stream,
            Connection::Tls(stream) => &stream.sock,
        }
    }

    fn shutdown(&mut self) {
        // close_notify only makes sense on an established session. The peer may already be gone.
        if let Connection::Tls(stream) = self {
            if !stream.conn.is_handshaking() {
                stream.conn.send_close_notify();
                while stream.conn.wants_write() {
                    match stream.conn.write_tls(&mut stream.sock) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            }
        }
        if let Err(err) = self.socket().shutdown(Shutdown::Both) {
            // NotConnected just means the peer closed first.
            if err.kind() != io::ErrorKind::NotConnected {
                debug!(error = %err, "socket shutdown failed");
            }
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(stream) => stream.read(buf),
            Connection::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(stream) => stream.write(buf),
            Connection::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(stream) => stream.flush(),
            Connection::Tls(stream) => stream.flush(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/*
Issues validated GET requests.

The client holds no sockets. It only carries the timeout and the TLS trust configuration,
which always verifies certificates and hostnames. Every call to get() opens a fresh
connection that belongs to the returned Response.
*/
#[derive(Clone)]
pub struct Client {
    timeout: Duration,
    tls: Arc<ClientConfig>,
}

impl Client {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_options(DEFAULT_TIMEOUT, None)
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::with_options(config.timeout(), config.ca_file.as_deref())
    }

    // `ca_file` adds PEM trust anchors on top of the bundled web PKI roots.
    pub fn with_options(timeout: Duration, ca_file: Option<&Path>) -> Result<Self, ClientError> {
        let extra = match ca_file {
            Some(path) => load_certificates(path)?,
            None => Vec::new(),
        };
        Ok(Client {
            timeout,
            tls: Arc::new(tls_config(extra)?),
        })
    }

    /*
    Opens `url` with a single GET and returns the live response.

    1. The URL must pass the allow-list, otherwise NotPermitted (no I/O happens).
    2. Port is the explicit one, or 80 / 443 by scheme.
    3. http gets a plain socket; https gets a verified TLS session.
    4. One GET is written, and the status line + headers are read.

    No retries. If anything fails after the socket is opened, the connection is dropped
    (and therefore closed) before the error reaches the caller.
    */
    pub fn get(&self, url: &str) -> Result<Response, ClientError> {
        let parsed = match parse_allowed(url) {
            Some(parsed) => parsed,
            None => {
                warn!(url, "rejecting URL outside the allow-list");
                return Err(ClientError::NotPermitted { url: url.to_string() });
            }
        };

        // parse_allowed() guarantees a host and an http(s) scheme.
        let host = parsed.host_str().unwrap_or_default().to_string();
        let port = parsed
            .port_or_known_default()
            .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });

        let stream = self.connect(&host, port)?;
        let mut connection = if parsed.scheme() == "https" {
            self.wrap_tls(stream, &host)?
        } else {
            Connection::Plain(stream)
        };

        let request = build_get_request(&parsed);
        connection
            .write_all(&request)
            .and_then(|_| connection.flush())
            .map_err(|err| self.io_failure(&host, err))?;
        debug!(%host, port, target = %build_request_target(&parsed), "request sent");

        let mut reader = BufReader::new(connection);
        let head = read_head(&mut reader).map_err(|err| match err {
            ClientError::Io(io) => self.io_failure(&host, io),
            other => other,
        })?;
        debug!(%host, status = head.status, "response head received");

        Response::new(head, reader, host, self.timeout)
    }

    // Tries every resolved address in order; the last failure wins.
    fn connect(&self, host: &str, port: u16) -> Result<TcpStream, ClientError> {
        let addrs = (host, port).to_socket_addrs().map_err(|source| ClientError::Connect {
            host: host.to_string(),
            port,
            source,
        })?;

        let mut last_err =
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected");
                    return Ok(stream);
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = err;
                }
            }
        }

        if is_timeout_kind(last_err.kind()) {
            return Err(ClientError::Timeout {
                host: host.to_string(),
                seconds: self.timeout.as_secs(),
            });
        }
        Err(ClientError::Connect {
            host: host.to_string(),
            port,
            source: last_err,
        })
    }

    // Runs the handshake eagerly so certificate problems surface as TLS errors here.
    fn wrap_tls(&self, stream: TcpStream, host: &str) -> Result<Connection, ClientError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| ClientError::InvalidServerName(host.to_string()))?;
        let session = ClientConnection::new(self.tls.clone(), server_name)?;
        let mut connection = Connection::Tls(Box::new(StreamOwned::new(session, stream)));

        if let Connection::Tls(tls) = &mut connection {
            while tls.conn.is_handshaking() {
                if let Err(err) = tls.conn.complete_io(&mut tls.sock) {
                    return Err(self.io_failure(host, err));
                }
            }
            debug!(host, version = ?tls.conn.protocol_version(), "TLS handshake complete");
        }
        Ok(connection)
    }

    // Sorts an I/O error into timeout, TLS failure or plain I/O.
    fn io_failure(&self, host: &str, err: io::Error) -> ClientError {
        if is_timeout_kind(err.kind()) {
            return ClientError::Timeout {
                host: host.to_string(),
                seconds: self.timeout.as_secs(),
            };
        }
        if let Some(tls) = err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
            return ClientError::Tls(tls.clone());
        }
        ClientError::Io(err)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("timeout", &self.timeout).finish()
    }
}

// One-shot GET with the default client: 2 second timeout, bundled roots only.
pub fn get(url: &str) -> Result<Response, ClientError> {
    Client::new()?.get(url)
}

fn tls_config(extra: Vec<CertificateDer<'static>>) -> Result<ClientConfig, ClientError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for cert in extra {
        roots.add(cert)?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    return Ok(config);
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let invalid = |reason: String| ClientError::InvalidCertificates {
        path: path.display().to_string(),
        reason,
    };
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|err| invalid(err.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid(err.to_string()))?;
    if certs.is_empty() {
        return Err(invalid("no certificates found".to_string()));
    }
    Ok(certs)
}
