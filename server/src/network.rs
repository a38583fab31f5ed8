//! TCP front end: binds the listener, starts the background loops and
//! hands every accepted connection to its own session.

use crate::broadcast::BroadcastEngine;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::run_health_sweep;
use crate::session::{spawn_session, SessionId};
use crate::simulation::{run_simulation_loop, simulation_for};
use log::{error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct Server {
    listener: TcpListener,
    engine: Arc<BroadcastEngine>,
}

impl Server {
    /// Binds the listening socket. This is the only fatal failure.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            engine: Arc::new(BroadcastEngine::new(Arc::new(config))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn engine(&self) -> Arc<BroadcastEngine> {
        Arc::clone(&self.engine)
    }

    /// Runs until the process is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the simulation, the health sweep and the accept loop until
    /// `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let simulation =
            simulation_for(Arc::clone(&self.engine)).map(|sim| tokio::spawn(run_simulation_loop(sim)));
        if simulation.is_none() {
            warn!("Creature commands already taken, simulation not started");
        }
        let health = tokio::spawn(run_health_sweep(Arc::clone(&self.engine)));

        info!("Server started successfully");
        tokio::pin!(shutdown);
        let mut next_id: SessionId = 1;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Could not disable Nagle for {}: {}", addr, e);
                        }
                        spawn_session(stream, addr, next_id, Arc::clone(&self.engine));
                        next_id += 1;
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        error!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        if let Some(simulation) = simulation {
            simulation.abort();
        }
        health.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{read_envelope, write_envelope};
    use shared::{Envelope, Message};
    use tokio::net::TcpStream;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default().without_creatures()
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind(local_config()).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = Server::bind(local_config()).await.unwrap();
        let taken = first.local_addr().unwrap().port();
        let result = Server::bind(ServerConfig {
            port: taken,
            ..local_config()
        })
        .await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_accepts_and_answers_ping() {
        let server = Server::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut ping = Envelope::new("probe", Message::Ping);
        ping.sequence = 1;
        write_envelope(&mut stream, &ping).await.unwrap();
        let pong = read_envelope(&mut stream).await.unwrap();
        assert_eq!(pong.message, Message::Pong { echo: 1 });

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
    }
}
