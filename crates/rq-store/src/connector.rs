//! Store connector — turns a [`RedisConfig`] into one live [`StoreHandle`].
//!
//! Resolution happens in two steps. [`ConnectionTarget::resolve`] applies
//! the option precedence (URL, password file, sentinel, direct) without
//! touching the network. [`StoreHandle::open`] then makes a single
//! connection attempt and verifies it with `PING`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use redis::sentinel::{Sentinel, SentinelNodeConnectionInfo};
use redis::{Client, Connection, RedisConnectionInfo, RedisResult, TlsMode};
use rq_core::RedisConfig;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{StoreError, StoreResult};

/// A sentinel node address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelNode {
    pub host: String,
    pub port: u16,
}

/// Where and how to connect, after option precedence is applied.
#[derive(Clone, PartialEq)]
pub enum ConnectionTarget {
    /// A user supplied URL, used verbatim.
    Url(String),
    /// A URL built from host/port/db/password/tls.
    Direct {
        url: String,
        host: String,
        port: u16,
        db: i64,
    },
    /// Discover the current master through sentinel.
    Sentinel {
        nodes: Vec<SentinelNode>,
        master: String,
        db: i64,
        password: Option<String>,
        tls: bool,
    },
}

impl ConnectionTarget {
    pub fn resolve(config: &RedisConfig) -> StoreResult<Self> {
        if let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(ConnectionTarget::Url(url.to_string()));
        }

        let password = resolve_password(config)?;

        if let Some(hosts) = config.sentinel_hosts.as_deref().filter(|h| !h.trim().is_empty()) {
            let nodes = parse_sentinel_hosts(hosts, config.sentinel_port)?;
            let master = config
                .sentinel_master
                .clone()
                .filter(|m| !m.is_empty())
                .ok_or_else(|| {
                    StoreError::Config("sentinel_master is required with sentinel_hosts".into())
                })?;
            return Ok(ConnectionTarget::Sentinel {
                nodes,
                master,
                db: config.db,
                password,
                tls: config.tls,
            });
        }

        let url = build_url(
            &config.host,
            config.port,
            Some(config.db),
            password.as_deref(),
            config.tls,
        )?;
        Ok(ConnectionTarget::Direct {
            url,
            host: config.host.clone(),
            port: config.port,
            db: config.db,
        })
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Url(_) => f.write_str("Url(<redacted>)"),
            ConnectionTarget::Direct { host, port, db, .. } => f
                .debug_struct("Direct")
                .field("host", host)
                .field("port", port)
                .field("db", db)
                .finish(),
            ConnectionTarget::Sentinel {
                nodes, master, db, tls, ..
            } => f
                .debug_struct("Sentinel")
                .field("nodes", nodes)
                .field("master", master)
                .field("db", db)
                .field("tls", tls)
                .finish(),
        }
    }
}

/// The password to authenticate with.
///
/// A configured `password_file` wins over `password`; its content is
/// trimmed of surrounding whitespace. An unreadable file is an error.
pub fn resolve_password(config: &RedisConfig) -> StoreResult<Option<String>> {
    match &config.password_file {
        Some(path) => {
            let content =
                std::fs::read_to_string(path).map_err(|source| StoreError::PasswordFile {
                    path: path.clone(),
                    source,
                })?;
            debug!(?path, "redis password read from file");
            Ok(Some(content.trim().to_string()))
        }
        None => Ok(config.password.clone()),
    }
}

/// Parse `host[:port],host[:port],...`, using `default_port` where omitted.
pub fn parse_sentinel_hosts(hosts: &str, default_port: u16) -> StoreResult<Vec<SentinelNode>> {
    let mut nodes = Vec::new();
    for entry in hosts.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let node = match entry.rsplit_once(':') {
            Some((host, port)) => SentinelNode {
                host: host.to_string(),
                port: port.parse().map_err(|_| {
                    StoreError::Config(format!("invalid sentinel port in {entry:?}"))
                })?,
            },
            None => SentinelNode {
                host: entry.to_string(),
                port: default_port,
            },
        };
        if node.host.is_empty() {
            return Err(StoreError::Config(format!("missing sentinel host in {entry:?}")));
        }
        nodes.push(node);
    }
    if nodes.is_empty() {
        return Err(StoreError::Config("sentinel_hosts is empty".into()));
    }
    Ok(nodes)
}

fn build_url(
    host: &str,
    port: u16,
    db: Option<i64>,
    password: Option<&str>,
    tls: bool,
) -> StoreResult<String> {
    let scheme = if tls { "rediss" } else { "redis" };
    let base = match db {
        Some(db) => format!("{scheme}://{host}:{port}/{db}"),
        None => format!("{scheme}://{host}:{port}"),
    };
    let mut url = Url::parse(&base)
        .map_err(|e| StoreError::Config(format!("invalid redis address {host}:{port}: {e}")))?;
    if let Some(password) = password {
        url.set_password(Some(password))
            .map_err(|()| StoreError::Config(format!("cannot set password for {host}:{port}")))?;
    }
    Ok(url.to_string())
}

// ── StoreHandle ─────────────────────────────────────────────────────

enum Source {
    Client(Client),
    Sentinel {
        sentinel: Mutex<Sentinel>,
        master: String,
        node: SentinelNodeConnectionInfo,
    },
}

/// The process-wide live connection to the store.
///
/// Holds one cached connection behind a mutex, so concurrent callers
/// serialise per command. A failed command drops the cached connection;
/// the next command reconnects, which for sentinel targets re-resolves
/// the current master.
pub struct StoreHandle {
    source: Source,
    conn: Mutex<Option<Connection>>,
    description: String,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("target", &self.description)
            .finish()
    }
}

impl StoreHandle {
    /// Resolve the config and connect.
    pub fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let target = ConnectionTarget::resolve(config)?;
        Self::open(&target)
    }

    /// Make one connection attempt against `target` and verify it.
    pub fn open(target: &ConnectionTarget) -> StoreResult<Self> {
        let description = format!("{target:?}");
        let source = match target {
            ConnectionTarget::Url(url) | ConnectionTarget::Direct { url, .. } => {
                Source::Client(Client::open(url.as_str()).map_err(connection_error)?)
            }
            ConnectionTarget::Sentinel {
                nodes,
                master,
                db,
                password,
                tls,
            } => {
                let addrs = nodes
                    .iter()
                    .map(|n| build_url(&n.host, n.port, None, password.as_deref(), *tls))
                    .collect::<StoreResult<Vec<_>>>()?;
                let sentinel = Sentinel::build(addrs).map_err(connection_error)?;
                let node = SentinelNodeConnectionInfo {
                    tls_mode: tls.then_some(TlsMode::Secure),
                    redis_connection_info: Some(RedisConnectionInfo {
                        db: *db,
                        password: password.clone(),
                        ..Default::default()
                    }),
                };
                Source::Sentinel {
                    sentinel: Mutex::new(sentinel),
                    master: master.clone(),
                    node,
                }
            }
        };

        let handle = Self {
            source,
            conn: Mutex::new(None),
            description,
        };
        handle
            .with_connection(|conn| redis::cmd("PING").query::<String>(conn))
            .map_err(|e| match e {
                StoreError::Query(msg) => StoreError::Connection(msg),
                other => other,
            })?;
        info!(target = %handle.description, "connected to redis");
        Ok(handle)
    }

    fn new_connection(&self) -> StoreResult<Connection> {
        match &self.source {
            Source::Client(client) => client.get_connection().map_err(connection_error),
            Source::Sentinel {
                sentinel,
                master,
                node,
            } => {
                let mut sentinel = sentinel.lock().unwrap_or_else(PoisonError::into_inner);
                let client = sentinel
                    .master_for(master, Some(node))
                    .map_err(connection_error)?;
                debug!(%master, "resolved sentinel master");
                client.get_connection().map_err(connection_error)
            }
        }
    }

    /// Run `f` against the cached connection, connecting first if needed.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.new_connection()?,
        };
        match f(&mut conn) {
            Ok(value) => {
                *guard = Some(conn);
                Ok(value)
            }
            Err(e) => {
                // The connection may be mid-reply; never reuse it.
                warn!(target = %self.description, error = %e, "redis command failed");
                Err(StoreError::Query(e.to_string()))
            }
        }
    }
}

fn connection_error(e: redis::RedisError) -> StoreError {
    StoreError::Connection(e.to_string())
}
