//! respool opens, initializes and validates blocking connections to servers
//! that speak RESP, the request/response protocol of Redis and compatible
//! stores. It is the layer that sits between a generic object pool and the
//! wire: a pool asks a [`ConnectionFactory`] for connections, the factory
//! opens them (over TLS if configured), runs the configured initialization in
//! as few round trips as possible and hands them back, ready for commands.
//!
//! # Basic Operation
//!
//! ```rust,no_run
//! use respool::{cmd, ConnectionFactoryBuilder, Node};
//!
//! fn do_something() -> respool::RespResult<()> {
//!     let factory = ConnectionFactoryBuilder::new(Node::new("127.0.0.1", 6379))
//!         .client_name("inventory")
//!         .build()?;
//!     let mut con = factory.create()?;
//!     let reply = con.req_command(cmd("ECHO").arg("hello"))?;
//!     println!("{reply:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Connection Parameters
//!
//! Factories can also be configured from a URL:
//!
//! ```plain
//! resp://[<username>][:<password>@]<hostname>[:port][/?<options>]
//! resps://[<username>][:<password>@]<hostname>[:port][/?<options>]
//! ```
//!
//! `resps` enables TLS. The options are `client_name`, `read_only`,
//! `connect_timeout` and `socket_timeout` (milliseconds).
//!
//! # Reply Modes
//!
//! A server can be told to stop answering (`CLIENT REPLY OFF`), to skip the
//! answer to the next command (`CLIENT REPLY SKIP`), or to answer again
//! (`CLIENT REPLY ON`). A [`Connection`] tracks this in its [`ReplyMode`] and
//! reads exactly as many replies as the server sends:
//!
//! ```rust,no_run
//! # fn run(con: &mut respool::Connection) -> respool::RespResult<()> {
//! con.reply_off()?;
//! assert_eq!(con.req_command(respool::cmd("PING").arg("fire-and-forget"))?, None);
//! con.reply_on()?;
//! # Ok(()) }
//! ```
//!
//! Any I/O or parse error closes the connection, since the stream can no
//! longer be trusted to be in sync.
//!
//! # Errors
//!
//! Failures to create a connection carry the [`Node`] they happened on and a
//! [`NodeFailure`] telling apart unreachable nodes from nodes that rejected
//! the configuration. [`RespError::retry_method`] tells callers what to do
//! next, and a [`DelayTable`] how long to wait before doing it.
//!
//! # Pooling
//!
//! With the `r2d2` feature (on by default) a [`ConnectionFactory`] is an
//! `r2d2::ManageConnection`:
//!
//! ```rust,no_run
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = respool::ConnectionFactoryBuilder::from_url("resp://127.0.0.1/")?.build()?;
//! let pool = r2d2::Pool::builder().max_size(4).build(factory)?;
//! let mut con = pool.get()?;
//! con.req_command(&respool::cmd("PING"))?;
//! # Ok(()) }
//! ```

#![deny(non_camel_case_types)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, warn(rustdoc::broken_intra_doc_links))]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod macros;

pub use crate::backoff::{exponential, DelayTable, ExponentialBackoff, MAX_DELAY_TABLE_LEN};
pub use crate::cmd::{cmd, ArgWrite, Cmd, ToArgs};
pub use crate::connection::{
    io::{ActualConnection, ConnectionDriver, TcpConnection, TcpRustlsConnection},
    Connection, InitOptions, ReplyMode, ReplyOp, TcpSettings, Transition, DEFAULT_PORT,
    DEFAULT_TIMEOUT,
};
pub use crate::errors::{
    ErrorKind, NodeFailure, RespError, RetryMethod, ServerError, ServerErrorKind,
};
pub use crate::factory::{
    ConnectionFactory, ConnectionFactoryBuilder, InitCommand, InitKind, InitStrategy,
};
pub use crate::node::Node;
pub use crate::parser::{parse_resp_value, Parser};
pub use crate::pipeline::{pipe, Pipeline};
pub use crate::pool::Pooled;
pub use crate::tls::{
    ClientTlsConfig, HostnameVerifier, TlsCertificates, TlsConfig, TlsConfigBuilder, TlsParams,
};
pub use crate::types::{RespResult, Value};

mod backoff;
mod cmd;
mod connection;
mod errors;
mod factory;
mod node;
mod parser;
mod pipeline;
mod pool;
mod tls;
mod types;
