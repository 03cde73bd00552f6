//! Async stream abstraction for tokio.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(feature = "tls")]
use tokio_native_tls::TlsStream;

use crate::error::{Error, Result};
use crate::opts::Opts;
#[cfg(feature = "tls")]
use crate::opts::{SslOpts, TlsVersion};

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Dial the server named by `opts`: a Unix socket if `host` starts with `/`, TCP otherwise.
    pub async fn connect(opts: &Opts) -> Result<Self> {
        if opts.is_unix_socket() {
            #[cfg(unix)]
            {
                let path = opts.unix_socket_path();
                tracing::debug!(%path, "dialing unix socket");
                return Ok(Self::Unix(UnixStream::connect(&path).await?));
            }
            #[cfg(not(unix))]
            {
                return Err(Error::InvalidUsage(
                    "Unix socket hosts are not supported on this platform".into(),
                ));
            }
        }

        if opts.host.is_empty() {
            return Err(Error::InvalidUsage("host is empty".into()));
        }
        let tcp = TcpStream::connect((opts.host.as_str(), opts.port)).await?;
        tcp.set_nodelay(true)?;
        if opts.keepalive {
            set_keepalive(&tcp, opts.keepalive_initial_delay)?;
        }
        Ok(Self::Tcp(tcp))
    }

    /// Read whatever is available, up to `buf.len()` bytes. `Ok(0)` is end of stream.
    ///
    /// Cancel-safe: no bytes are lost if the future is dropped before completion.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf).await,
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.read(buf).await,
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf).await,
        }
    }

    pub async fn read_u8(&mut self) -> io::Result<u8> {
        match self {
            Stream::Tcp(s) => s.read_u8().await,
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.read_u8().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.read_u8().await,
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.write_all(buf).await,
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.write_all(buf).await,
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush().await,
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.flush().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.flush().await,
        }
    }

    /// Write and flush in one call.
    pub async fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf).await?;
        self.flush().await
    }

    /// Close the write half gracefully.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown().await,
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.shutdown().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown().await,
        }
    }

    /// Run the TLS handshake over this TCP stream.
    #[cfg(feature = "tls")]
    pub async fn upgrade_to_tls(self, host: &str, ssl: &SslOpts) -> Result<Self> {
        let tcp = match self {
            Stream::Tcp(tcp) => tcp,
            Stream::Tls(_) => return Err(Error::Protocol("stream is already encrypted".into())),
            #[cfg(unix)]
            Stream::Unix(_) => {
                return Err(Error::InvalidUsage("TLS over Unix sockets is not supported".into()));
            }
        };

        let connector = tokio_native_tls::TlsConnector::from(tls_connector(host, ssl)?);
        let tls = connector.connect(host, tcp).await?;
        tracing::debug!(host, "TLS established");
        Ok(Stream::Tls(Box::new(tls)))
    }
}

fn set_keepalive(tcp: &TcpStream, initial_delay: std::time::Duration) -> io::Result<()> {
    let socket = socket2::SockRef::from(tcp);
    socket.set_keepalive(true)?;
    if !initial_delay.is_zero() {
        let keepalive = socket2::TcpKeepalive::new().with_time(initial_delay);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    tracing::debug!(?initial_delay, "TCP keepalive enabled");
    Ok(())
}

#[cfg(feature = "tls")]
fn tls_connector(host: &str, ssl: &SslOpts) -> Result<native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    for pem in &ssl.root_certs {
        builder.add_root_certificate(native_tls::Certificate::from_pem(pem)?);
    }
    if let Some(identity) = &ssl.identity {
        builder.identity(native_tls::Identity::from_pkcs12(
            &identity.pkcs12,
            &identity.password,
        )?);
    }

    builder.danger_accept_invalid_certs(!ssl.verify_peer);
    builder.danger_accept_invalid_hostnames(!ssl.verify_peer || !ssl.verify_hostname);
    builder.min_protocol_version(Some(match ssl.min_protocol_version {
        TlsVersion::Tls10 => native_tls::Protocol::Tlsv10,
        TlsVersion::Tls11 => native_tls::Protocol::Tlsv11,
        TlsVersion::Tls12 => native_tls::Protocol::Tlsv12,
    }));
    if !ssl.alpn_protocols.is_empty() {
        let protocols: Vec<&str> = ssl.alpn_protocols.iter().map(String::as_str).collect();
        builder.request_alpns(&protocols);
    }
    // SNI must not carry an IP address.
    builder.use_sni(host.parse::<std::net::IpAddr>().is_err());

    Ok(builder.build()?)
}
