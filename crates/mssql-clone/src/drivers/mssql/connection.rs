//! Pooled Tiberius connections.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{CloneError, Result};

const TDS_MAX_PACKET_SIZE: u32 = 32767;
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub type MssqlClient = Client<Compat<TcpStream>>;
pub type MssqlPool = Pool<TiberiusConnectionManager>;
pub type MssqlConnection = PooledConnection<'static, TiberiusConnectionManager>;

/// bb8 manager producing SQL-authenticated Tiberius clients for one endpoint.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: DatabaseConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let db = &self.config;
        let mut config = Config::new();
        config.host(&db.host);
        config.port(db.port);
        config.database(&db.database);
        config.authentication(AuthMethod::sql_server(&db.user, &db.password));
        config.packet_size(TDS_MAX_PACKET_SIZE);

        match (db.encrypt, db.trust_server_cert) {
            (true, true) => {
                config.encryption(EncryptionLevel::Required);
                config.trust_cert();
            }
            (true, false) => config.encryption(EncryptionLevel::Required),
            (false, _) => config.encryption(EncryptionLevel::NotSupported),
        }
        config
    }
}

fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: format!("{}: {}", context, e),
    }
}

/// TCP stream with nodelay and keepalive set.
async fn open_tcp(addr: String) -> std::result::Result<TcpStream, tiberius::error::Error> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| io_error(e, "connecting"))?;
    stream.set_nodelay(true).ok();

    let socket = socket2::Socket::from(
        stream
            .into_std()
            .map_err(|e| io_error(e, "detaching socket"))?,
    );
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("TCP keepalive not set: {}", e);
    }

    let std_stream: std::net::TcpStream = socket.into();
    std_stream.set_nonblocking(true).ok();
    TcpStream::from_std(std_stream).map_err(|e| io_error(e, "reattaching socket"))
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = MssqlClient;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = open_tcp(config.get_addr()).await?;
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, client: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _client: &mut Self::Connection) -> bool {
        false
    }
}

/// Build a pool for one endpoint. No connection is opened until first use.
pub async fn build_pool(config: &DatabaseConfig, max_size: u32) -> Result<MssqlPool> {
    let manager = TiberiusConnectionManager::new(config.clone());
    let pool = Pool::builder()
        .max_size(max_size.max(1))
        .min_idle(Some(0))
        .connection_timeout(POOL_CONNECTION_TIMEOUT)
        .idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .test_on_check_out(true)
        .build(manager)
        .await
        .map_err(|e| CloneError::pool(e, "creating SQL Server connection pool"))?;

    info!(
        "SQL Server pool ready: {}:{}/{} (pool_size={})",
        config.host, config.port, config.database, max_size
    );
    Ok(pool)
}

/// Check a connection out of the pool.
pub async fn checkout(pool: &MssqlPool, context: &str) -> Result<MssqlConnection> {
    pool.get_owned()
        .await
        .map_err(|e| CloneError::pool(e, context))
}

/// Round-trip `SELECT 1`.
pub async fn ping(pool: &MssqlPool) -> Result<()> {
    let mut conn = checkout(pool, "testing SQL Server connection").await?;
    conn.simple_query("SELECT 1").await?.into_row().await?;
    Ok(())
}
