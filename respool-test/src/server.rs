//! An in-process server for integration tests.
//!
//! The server listens on a free local port and answers the commands the
//! connection layer relies on: `AUTH`, `CLIENT SETNAME`, `CLIENT REPLY`,
//! `READONLY`, `PING` and `ECHO`. Reply suppression follows the real server:
//! `OFF` and `SKIP` are never answered, a pending skip drops the reply to the
//! next command, and `ON` clears both.

use std::{
    io::{BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use respool::Node;
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    ServerConfig, ServerConnection, StreamOwned,
};

use crate::read_request;

/// Configures a [`MockServer`].
#[derive(Clone, Default)]
pub struct MockServerBuilder {
    username: Option<String>,
    password: Option<String>,
    reject_read_only: bool,
    tls: bool,
}

impl MockServerBuilder {
    /// Requires `AUTH` with this password before any other command.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Accepts this ACL user in addition to `default`.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Answers `READONLY` with an error, like a server without cluster support.
    pub fn reject_read_only(mut self) -> Self {
        self.reject_read_only = true;
        self
    }

    /// Serves TLS with a self-signed certificate for `localhost`.
    pub fn tls(mut self) -> Self {
        self.tls = true;
        self
    }

    /// Binds the listener and starts accepting connections.
    pub fn start(self) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let (certificate_pem, tls) = if self.tls {
            let (pem, config) = self_signed_server_config();
            (Some(pem), Some(config))
        } else {
            (None, None)
        };

        let shared = Arc::new(Shared::default());
        let settings = Arc::new(self);
        let stopped = Arc::new(AtomicBool::new(false));

        let accept_thread = {
            let shared = shared.clone();
            let stopped = stopped.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    *shared.accepted.lock().unwrap() += 1;
                    let shared = shared.clone();
                    let settings = settings.clone();
                    let tls = tls.clone();
                    thread::spawn(move || serve(stream, &settings, &shared, tls));
                }
            })
        };

        MockServer {
            port,
            shared,
            stopped,
            certificate_pem,
            accept_thread: Some(accept_thread),
        }
    }
}

#[derive(Default)]
struct Shared {
    commands: Mutex<Vec<Vec<String>>>,
    client_names: Mutex<Vec<String>>,
    accepted: Mutex<usize>,
}

/// A running server. Stops accepting connections when dropped.
pub struct MockServer {
    port: u16,
    shared: Arc<Shared>,
    stopped: Arc<AtomicBool>,
    certificate_pem: Option<String>,
    accept_thread: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Starts a plain server without authentication.
    pub fn start() -> MockServer {
        MockServer::builder().start()
    }

    /// Starts configuring a server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    /// The address to connect to, as an IP literal.
    pub fn node(&self) -> Node {
        Node::new("127.0.0.1", self.port)
    }

    /// The port the server listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Every command received so far, on any connection.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.shared.commands.lock().unwrap().clone()
    }

    /// Names registered with `CLIENT SETNAME`.
    pub fn client_names(&self) -> Vec<String> {
        self.shared.client_names.lock().unwrap().clone()
    }

    /// Number of connections accepted.
    pub fn connections_accepted(&self) -> usize {
        *self.shared.accepted.lock().unwrap()
    }

    /// The server certificate in PEM format, for TLS servers.
    pub fn certificate_pem(&self) -> Option<&str> {
        self.certificate_pem.as_deref()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        // wake up the accept loop so it sees the flag
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

fn self_signed_server_config() -> (String, Arc<ServerConfig>) {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert_params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    let cert = cert_params.self_signed(&key_pair).unwrap();

    let server_cert = CertificateDer::from(cert.der().to_vec());
    let server_key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![server_cert], server_key)
        .unwrap();
    (cert.pem(), Arc::new(config))
}

fn serve(
    stream: TcpStream,
    settings: &MockServerBuilder,
    shared: &Shared,
    tls: Option<Arc<ServerConfig>>,
) {
    let result = match tls {
        Some(config) => {
            let Ok(session) = ServerConnection::new(config) else {
                return;
            };
            run_session(StreamOwned::new(session, stream), settings, shared)
        }
        None => run_session(stream, settings, shared),
    };
    if let Err(err) = result {
        log::trace!("mock connection ended: {err}");
    }
}

/// Per connection state.
#[derive(Default)]
struct Session {
    authenticated: bool,
    reply_off: bool,
    skip_current: bool,
    skip_next: bool,
}

fn run_session<S: Read + Write>(
    stream: S,
    settings: &MockServerBuilder,
    shared: &Shared,
) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let mut session = Session {
        authenticated: settings.password.is_none(),
        ..Session::default()
    };

    while let Some(args) = read_request(&mut stream)? {
        let args: Vec<String> = args
            .into_iter()
            .map(|arg| String::from_utf8_lossy(&arg).into_owned())
            .collect();
        shared.commands.lock().unwrap().push(args.clone());

        let reply = respond(&args, settings, shared, &mut session);
        if let Some(reply) = reply {
            if !session.reply_off && !session.skip_current {
                stream.get_mut().write_all(reply.as_bytes())?;
                stream.get_mut().flush()?;
            }
        }

        if session.skip_current {
            session.skip_current = false;
        }
        if session.skip_next {
            session.skip_current = true;
            session.skip_next = false;
        }
    }
    Ok(())
}

fn upper(args: &[String], idx: usize) -> Option<String> {
    args.get(idx).map(|arg| arg.to_ascii_uppercase())
}

fn bulk(value: &str) -> String {
    format!("${}\r\n{value}\r\n", value.len())
}

/// Computes the reply to a command, updating the session. `None` means the
/// command never gets a reply.
fn respond(
    args: &[String],
    settings: &MockServerBuilder,
    shared: &Shared,
    session: &mut Session,
) -> Option<String> {
    let name = upper(args, 0).unwrap_or_default();

    if name == "AUTH" {
        return Some(authenticate(&args[1..], settings, session));
    }
    if !session.authenticated {
        return Some("-NOAUTH Authentication required.\r\n".into());
    }

    let reply = match (name.as_str(), args.len()) {
        ("PING", 1) => "+PONG\r\n".to_string(),
        ("PING", 2) | ("ECHO", 2) => bulk(&args[1]),
        ("READONLY", 1) if settings.reject_read_only => {
            "-ERR This instance has cluster support disabled\r\n".to_string()
        }
        ("READONLY", 1) => "+OK\r\n".to_string(),
        ("CLIENT", 3) if upper(args, 1).as_deref() == Some("SETNAME") => {
            shared.client_names.lock().unwrap().push(args[2].clone());
            "+OK\r\n".to_string()
        }
        ("CLIENT", 3) if upper(args, 1).as_deref() == Some("REPLY") => {
            match upper(args, 2).as_deref() {
                Some("ON") => {
                    session.reply_off = false;
                    session.skip_current = false;
                    "+OK\r\n".to_string()
                }
                Some("OFF") => {
                    session.reply_off = true;
                    return None;
                }
                Some("SKIP") => {
                    if !session.reply_off {
                        session.skip_next = true;
                    }
                    return None;
                }
                _ => "-ERR syntax error\r\n".to_string(),
            }
        }
        _ => format!("-ERR unknown command '{}'\r\n", args.join(" ")),
    };
    Some(reply)
}

fn authenticate(args: &[String], settings: &MockServerBuilder, session: &mut Session) -> String {
    let Some(expected) = &settings.password else {
        return "-ERR AUTH <password> called without any password configured for the default user\r\n"
            .to_string();
    };
    let (user, password) = match args {
        [password] => ("default", password),
        [user, password] => (user.as_str(), password),
        _ => return "-ERR wrong number of arguments for 'auth' command\r\n".to_string(),
    };
    let user_known = user == "default" || settings.username.as_deref() == Some(user);
    if user_known && password == expected {
        session.authenticated = true;
        "+OK\r\n".to_string()
    } else {
        "-WRONGPASS invalid username-password pair or user is disabled.\r\n".to_string()
    }
}
