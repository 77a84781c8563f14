//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use challtestsrv::{ChallengeServer, NotFoundHandler};
use challtestsrv_config::Config;

/// Accepts any server certificate; signatures are still checked
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Running challenge server bound to loopback ephemeral ports
pub struct TestServer {
    pub server: ChallengeServer,
    pub tls_addr: SocketAddr,
    pub management_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let mut config = Config::default();
        config.tls_alpn.address = "127.0.0.1:0".to_string();
        config.management.address = "127.0.0.1:0".to_string();

        let server = ChallengeServer::new(config).unwrap();
        let tls = server
            .tls_alpn_server(Arc::new(NotFoundHandler))
            .await
            .unwrap();
        let management = server.management_server().await.unwrap();

        let tls_addr = tls.local_addr().unwrap();
        let management_addr = management.as_ref().map(|m| m.local_addr().unwrap());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (management_tx, management_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let tls_shutdown = async move {
                let _ = shutdown_rx.await;
                let _ = management_tx.send(());
            };
            tokio::join!(tls.serve(tls_shutdown), async move {
                if let Some(management) = management {
                    management
                        .serve(async move {
                            let _ = management_rx.await;
                        })
                        .await;
                }
            });
        });

        Self {
            server,
            tls_addr,
            management_addr,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    /// Signal shutdown and wait for both listeners to drain
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not shut down")
            .unwrap();
    }
}

pub fn client_config(alpn: &[&[u8]]) -> ClientConfig {
    client_config_with_versions(alpn, rustls::DEFAULT_VERSIONS)
}

/// Client restricted to TLS 1.2
pub fn client_config_tls12(alpn: &[&[u8]]) -> ClientConfig {
    client_config_with_versions(alpn, &[&rustls::version::TLS12])
}

fn client_config_with_versions(
    alpn: &[&[u8]],
    versions: &[&'static rustls::SupportedProtocolVersion],
) -> ClientConfig {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let mut config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(versions)
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    config
}

/// Handshake with `addr`, sending `server_name` as SNI when it is a DNS name
pub async fn connect(
    addr: SocketAddr,
    server_name: &str,
    alpn: &[&[u8]],
) -> std::io::Result<TlsStream<TcpStream>> {
    connect_with(addr, server_name, client_config(alpn)).await
}

/// Handshake with an explicit client configuration
pub async fn connect_with(
    addr: SocketAddr,
    server_name: &str,
    config: ClientConfig,
) -> std::io::Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(server_name.to_string()).unwrap();
    let tcp = TcpStream::connect(addr).await?;

    tokio::time::timeout(Duration::from_secs(5), connector.connect(server_name, tcp))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake timed out"))?
}

/// Leaf certificate presented by the server
pub fn peer_certificate(stream: &TlsStream<TcpStream>) -> CertificateDer<'static> {
    let (_, connection) = stream.get_ref();
    connection.peer_certificates().unwrap()[0].clone()
}

/// Read until EOF, tolerating a peer that closes without close_notify
pub async fn read_to_close<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    buf
}
