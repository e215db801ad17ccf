//! Instrumented TCP echo listener.
//!
//! Every accepted connection is reported to a net server surface, and the
//! connection tasks run through a bounded pool reported to a pool surface.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use wirestat::config::EchoConfig;
use wirestat::metrics::{ConnectionMetrics, ConnectionSurface, MetricsFacade, PoolSurface};

pub struct EchoServer {
    listener: TcpListener,
    connections: Arc<ConnectionSurface>,
    pool: Arc<PoolSurface>,
    permits: Arc<Semaphore>,
}

impl EchoServer {
    pub async fn bind(config: &EchoConfig, facade: &MetricsFacade) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let local = listener.local_addr()?;
        info!(%local, "Echo listener bound");

        Ok(Self {
            listener,
            connections: facade.create_net_server_metrics(Some(local))?,
            pool: facade.create_pool_metrics("echo", "connections", config.max_connections)?,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    /// Accept connections forever.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let queued = self.pool.submitted();
                    let permit = match Arc::clone(&self.permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            self.pool.rejected(queued);
                            warn!(%addr, error = %e, "Echo pool closed - rejecting");
                            continue;
                        }
                    };
                    let usage = self.pool.begin(queued);
                    let connections = Arc::clone(&self.connections);
                    let pool = Arc::clone(&self.pool);

                    tokio::spawn(async move {
                        let succeeded = serve(stream, addr, &connections).await;
                        pool.end(usage, succeeded);
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept echo connection");
                }
            }
        }
    }
}

async fn serve(mut stream: TcpStream, addr: SocketAddr, metrics: &ConnectionSurface) -> bool {
    let remote = Some(addr);
    metrics.connected(remote);
    debug!(%addr, "Echo connection accepted");

    let mut buf = [0u8; 8192];
    let result: std::io::Result<()> = async {
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            metrics.bytes_read(remote, n as u64);
            stream.write_all(&buf[..n]).await?;
            metrics.bytes_written(remote, n as u64);
        }
    }
    .await;

    metrics.disconnected(remote);
    match result {
        Ok(()) => {
            debug!(%addr, "Echo connection closed");
            true
        }
        Err(e) => {
            metrics.exception_occurred(remote, &format!("{:?}", e.kind()));
            warn!(%addr, error = %e, "Echo connection error");
            false
        }
    }
}
