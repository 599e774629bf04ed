use std::{fmt, sync::Arc};

use rustls::{
    pki_types::{pem::PemObject as _, CertificateDer, PrivateKeyDer},
    ClientConfig, RootCertStore,
};

use crate::{ErrorKind, RespError, RespResult};

/// Decides whether the certificate chain presented by a server is acceptable
/// for the host the connection was opened to.
///
/// The verifier runs after the TLS handshake completed and after the
/// connector's own certificate verification succeeded. Returning `false`
/// aborts the connection with a connect failure.
pub trait HostnameVerifier: Send + Sync {
    /// `peer_certificates` starts with the end-entity certificate.
    fn verify(&self, host: &str, peer_certificates: &[CertificateDer<'_>]) -> bool;
}

impl<F> HostnameVerifier for F
where
    F: Fn(&str, &[CertificateDer<'_>]) -> bool + Send + Sync,
{
    fn verify(&self, host: &str, peer_certificates: &[CertificateDer<'_>]) -> bool {
        self(host, peer_certificates)
    }
}

/// Structure to hold mTLS client _certificate_ and _key_ binaries in PEM format
///
#[derive(Clone)]
pub struct ClientTlsConfig {
    /// client certificate byte stream in PEM format
    pub client_cert: Vec<u8>,
    /// client key byte stream in PEM format
    pub client_key: Vec<u8>,
}

/// Structure to hold TLS certificates
/// - `client_tls`: binaries of clientkey and certificate within a `ClientTlsConfig` structure if mTLS is used
/// - `root_cert`: binary CA certificate in PEM format if CA is not in local truststore
///
#[derive(Clone, Default)]
pub struct TlsCertificates {
    /// 'ClientTlsConfig' containing client certificate and key if mTLS is to be used
    pub client_tls: Option<ClientTlsConfig>,
    /// root certificate byte stream in PEM format if the local truststore is *not* to be used
    pub root_cert: Option<Vec<u8>>,
}

/// Handshake parameters applied on top of the connector.
#[derive(Clone, Debug)]
pub struct TlsParams {
    /// Name to present via SNI and to verify the certificate against.
    /// Defaults to the host of the node.
    pub server_name: Option<String>,
    /// ALPN protocols to offer, in order of preference.
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Whether to send the server name indication extension.
    pub enable_sni: bool,
}

impl Default for TlsParams {
    fn default() -> Self {
        TlsParams {
            server_name: None,
            alpn_protocols: Vec::new(),
            enable_sni: true,
        }
    }
}

/// Secure transport settings shared by every connection a factory opens.
///
/// Built once through [`TlsConfig::builder`] and immutable afterwards. When
/// TLS is disabled every other setting is ignored. When it is enabled the
/// connector is always present: if none was supplied, one trusting the
/// platform's root certificates is substituted at build time.
#[derive(Clone, Default)]
pub struct TlsConfig {
    enabled: bool,
    connector: Option<Arc<ClientConfig>>,
    params: TlsParams,
    hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
}

impl TlsConfig {
    /// A configuration with TLS turned off.
    pub fn disabled() -> Self {
        TlsConfig::default()
    }

    /// Starts building a configuration.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Returns true if connections are upgraded to TLS.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The rustls configuration used for the handshake. `None` when disabled.
    pub fn connector(&self) -> Option<&Arc<ClientConfig>> {
        self.connector.as_ref().filter(|_| self.enabled)
    }

    /// The handshake parameters.
    pub fn params(&self) -> &TlsParams {
        &self.params
    }

    /// The hostname verifier, if one was configured.
    pub fn hostname_verifier(&self) -> Option<&Arc<dyn HostnameVerifier>> {
        self.hostname_verifier.as_ref()
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .field("hostname_verifier", &self.hostname_verifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TlsConfig`].
#[derive(Clone, Default)]
pub struct TlsConfigBuilder {
    enabled: bool,
    connector: Option<Arc<ClientConfig>>,
    certificates: Option<TlsCertificates>,
    params: TlsParams,
    hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
}

impl TlsConfigBuilder {
    /// Turns TLS on or off. Setting a connector or certificates does not
    /// enable TLS by itself.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Uses a caller-provided rustls configuration for the handshake.
    /// Takes precedence over [`TlsConfigBuilder::certificates`].
    pub fn connector(mut self, connector: Arc<ClientConfig>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the connector from PEM encoded certificates: custom roots,
    /// a client identity for mutual TLS, or both.
    pub fn certificates(mut self, certificates: TlsCertificates) -> Self {
        self.certificates = Some(certificates);
        self
    }

    /// Overrides the name used for SNI and certificate verification.
    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.params.server_name = Some(server_name.into());
        self
    }

    /// Sets the ALPN protocols to offer.
    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.params.alpn_protocols = protocols;
        self
    }

    /// Enables or disables SNI.
    pub fn enable_sni(mut self, enable_sni: bool) -> Self {
        self.params.enable_sni = enable_sni;
        self
    }

    /// Sets a verifier consulted after every handshake.
    pub fn hostname_verifier(mut self, verifier: impl HostnameVerifier + 'static) -> Self {
        self.hostname_verifier = Some(Arc::new(verifier));
        self
    }

    /// Finalizes the configuration.
    pub fn build(self) -> RespResult<TlsConfig> {
        if !self.enabled {
            return Ok(TlsConfig {
                enabled: false,
                connector: None,
                params: self.params,
                hostname_verifier: None,
            });
        }

        let mut config = match (self.connector, self.certificates) {
            (Some(connector), _) => Arc::unwrap_or_clone(connector),
            (None, Some(certificates)) => create_rustls_config(Some(certificates))?,
            (None, None) => create_rustls_config(None)?,
        };
        config.alpn_protocols = self.params.alpn_protocols.clone();
        config.enable_sni = self.params.enable_sni;

        Ok(TlsConfig {
            enabled: true,
            connector: Some(Arc::new(config)),
            params: self.params,
            hostname_verifier: self.hostname_verifier,
        })
    }
}

struct ClientTlsParams {
    client_cert_chain: Vec<CertificateDer<'static>>,
    client_key: PrivateKeyDer<'static>,
}

fn tls_io_error(message: String) -> RespError {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, message).into()
}

fn retrieve_tls_certificates(
    certificates: TlsCertificates,
) -> RespResult<(Option<ClientTlsParams>, Option<RootCertStore>)> {
    let TlsCertificates {
        client_tls,
        root_cert,
    } = certificates;

    let client_tls_params = if let Some(ClientTlsConfig {
        client_cert,
        client_key,
    }) = client_tls
    {
        let client_cert_chain = CertificateDer::pem_slice_iter(&client_cert)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                tls_io_error(format!("Unable to parse client certificate chain PEM: {err}"))
            })?;

        let client_key = PrivateKeyDer::from_pem_slice(&client_key).map_err(|err| {
            tls_io_error(format!("Unable to extract private key from PEM file: {err}"))
        })?;

        Some(ClientTlsParams {
            client_cert_chain,
            client_key,
        })
    } else {
        None
    };

    let root_cert_store = if let Some(root_cert) = root_cert {
        let mut root_cert_store = RootCertStore::empty();
        for result in CertificateDer::pem_slice_iter(&root_cert) {
            let cert = result.map_err(|err| {
                tls_io_error(format!("Unable to parse root certificate PEM: {err}"))
            })?;

            if root_cert_store.add(cert).is_err() {
                fail!(tls_io_error("Unable to parse TLS trust anchors".to_string()));
            }
        }

        Some(root_cert_store)
    } else {
        None
    };

    Ok((client_tls_params, root_cert_store))
}

fn load_native_certs() -> RootCertStore {
    let rustls_native_certs::CertificateResult { certs, errors, .. } =
        rustls_native_certs::load_native_certs();
    for err in errors {
        log::warn!("Failed to load a native certificate: {err}");
    }
    let mut root_store = RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs);
    log::debug!("Loaded {added} native root certificates, ignored {ignored}");
    root_store
}

pub(crate) fn create_rustls_config(
    certificates: Option<TlsCertificates>,
) -> RespResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config =
        ClientConfig::builder_with_provider(provider).with_safe_default_protocol_versions()?;

    let (client_tls_params, root_cert_store) = match certificates {
        Some(certificates) => retrieve_tls_certificates(certificates)?,
        None => (None, None),
    };
    let config_builder =
        config.with_root_certificates(root_cert_store.unwrap_or_else(load_native_certs));

    let config = if let Some(ClientTlsParams {
        client_cert_chain,
        client_key,
    }) = client_tls_params
    {
        config_builder
            .with_client_auth_cert(client_cert_chain, client_key)
            .map_err(|err| {
                RespError::from((
                    ErrorKind::InvalidClientConfig,
                    "Unable to build client with TLS parameters provided.",
                    err.to_string(),
                ))
            })?
    } else {
        config_builder.with_no_client_auth()
    };

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject_all(_host: &str, _peer_certificates: &[CertificateDer<'_>]) -> bool {
        false
    }

    #[test]
    fn disabled_config_ignores_everything_else() {
        let config = TlsConfig::builder()
            .server_name("cache.internal")
            .hostname_verifier(reject_all)
            .build()
            .unwrap();
        assert!(!config.is_enabled());
        assert!(config.connector().is_none());
        assert!(config.hostname_verifier().is_none());
    }

    #[test]
    fn params_are_applied_to_the_connector() {
        let certs = TlsCertificates {
            client_tls: None,
            root_cert: Some(Vec::new()),
        };
        let config = TlsConfig::builder()
            .enabled(true)
            .certificates(certs)
            .alpn_protocols(vec![b"resp".to_vec()])
            .enable_sni(false)
            .build()
            .unwrap();

        let connector = config.connector().unwrap();
        assert_eq!(connector.alpn_protocols, vec![b"resp".to_vec()]);
        assert!(!connector.enable_sni);
    }

    #[test]
    fn garbage_client_key_is_rejected() {
        let certs = TlsCertificates {
            client_tls: Some(ClientTlsConfig {
                client_cert: Vec::new(),
                client_key: b"not a key".to_vec(),
            }),
            root_cert: Some(Vec::new()),
        };
        let err = TlsConfig::builder()
            .enabled(true)
            .certificates(certs)
            .build()
            .unwrap_err();
        assert!(err.is_io_error());
    }
}
