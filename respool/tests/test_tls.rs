use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use respool::{
    cmd, ConnectionFactoryBuilder, HostnameVerifier, TlsCertificates, TlsConfig, TlsConfigBuilder,
    Value,
};
use respool_test::MockServer;
use rustls::pki_types::CertificateDer;

fn trusting(server: &MockServer) -> TlsConfigBuilder {
    let root_cert = server
        .certificate_pem()
        .expect("TLS server has a certificate")
        .as_bytes()
        .to_vec();
    TlsConfig::builder()
        .enabled(true)
        .certificates(TlsCertificates {
            client_tls: None,
            root_cert: Some(root_cert),
        })
}

struct CountingRejecter {
    calls: Arc<AtomicUsize>,
}

impl HostnameVerifier for CountingRejecter {
    fn verify(&self, host: &str, peer_certificates: &[CertificateDer<'_>]) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(host, "localhost");
        assert!(!peer_certificates.is_empty());
        false
    }
}

fn localhost_only(host: &str, _peer_certificates: &[CertificateDer<'_>]) -> bool {
    host == "localhost"
}

#[test]
fn test_tls_round_trip() {
    let _ = env_logger::try_init();
    let server = MockServer::builder().tls().password("secret").start();
    let tls = trusting(&server).server_name("localhost").build().unwrap();
    let factory = ConnectionFactoryBuilder::new(server.node())
        .password("secret")
        .client_name("tls-client")
        .tls(tls)
        .build()
        .unwrap();

    let mut con = factory.create().unwrap();
    assert!(factory.validate(&mut con));
    assert_eq!(
        con.req_command(cmd("ECHO").arg("over tls")).unwrap(),
        Some(Value::BulkString(b"over tls".to_vec()))
    );
    assert_eq!(server.client_names(), vec!["tls-client".to_string()]);
    factory.destroy(con);
}

#[test]
fn test_certificate_name_mismatch_is_a_connect_failure() {
    let server = MockServer::builder().tls().start();
    // the certificate is issued for localhost, not for the IP literal
    let tls = trusting(&server).build().unwrap();
    let factory = ConnectionFactoryBuilder::new(server.node())
        .tls(tls)
        .build()
        .unwrap();

    let err = factory.create().unwrap_err();
    assert!(err.is_connect_failure());
    assert_eq!(err.node(), Some(&server.node()));
}

#[test]
fn test_hostname_verifier_can_reject() {
    let server = MockServer::builder().tls().start();
    let calls = Arc::new(AtomicUsize::new(0));
    let tls = trusting(&server)
        .server_name("localhost")
        .hostname_verifier(CountingRejecter {
            calls: calls.clone(),
        })
        .build()
        .unwrap();
    let factory = ConnectionFactoryBuilder::new(server.node())
        .tls(tls)
        .build()
        .unwrap();

    let err = factory.create().unwrap_err();
    assert!(err.is_connect_failure());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // nothing was sent before the verifier ran
    assert!(server.commands().is_empty());
}

#[test]
fn test_hostname_verifier_can_accept() {
    let server = MockServer::builder().tls().start();
    let tls = trusting(&server)
        .server_name("localhost")
        .hostname_verifier(localhost_only)
        .build()
        .unwrap();
    let factory = ConnectionFactoryBuilder::new(server.node())
        .tls(tls)
        .build()
        .unwrap();

    let mut con = factory.create().unwrap();
    assert!(factory.validate(&mut con));
}

#[test]
fn test_tls_client_against_plain_server() {
    let server = MockServer::start();
    let tls = TlsConfig::builder()
        .enabled(true)
        .server_name("localhost")
        .build()
        .unwrap();
    let factory = ConnectionFactoryBuilder::new(server.node())
        .socket_timeout(Duration::from_millis(500))
        .tls(tls)
        .build()
        .unwrap();

    let err = factory.create().unwrap_err();
    assert!(err.is_connect_failure());
}
