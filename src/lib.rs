#![allow(clippy::uninlined_format_args)]

use std::io::Cursor;

use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::HttpServer;

use crate::config::NodeConfig;
use crate::error::StartupError;
use crate::network::api;
use crate::network::raft;
use crate::store::Request;
use crate::store::Response;

pub mod app;
pub mod bootstrap;
pub mod command;
pub mod config;
pub mod consensus;
pub mod error;
pub mod network;
pub mod store;

pub type NodeId = u64;

openraft::declare_raft_types!(
    /// Declare the type configuration for the replicated user store.
    pub TypeConfig:
        D = Request,
        R = Response,
);

pub type Raft = openraft::Raft<TypeConfig>;

pub mod typ {
    use openraft::BasicNode;

    use crate::NodeId;

    pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<NodeId, E>;
    pub type RPCError<E = openraft::error::Infallible> = openraft::error::RPCError<NodeId, BasicNode, RaftError<E>>;

    pub type ClientWriteError = openraft::error::ClientWriteError<NodeId, BasicNode>;
}

/// Runs one node until both of its servers stop.
///
/// The raft RPC server is bound before the cluster is bootstrapped so peers
/// can reach this node as soon as elections start.
pub async fn start_user_node(config: NodeConfig) -> Result<(), StartupError> {
    let app = bootstrap::open(&config).await?;
    let app_data = Data::new(app);

    let raft_data = app_data.clone();
    let raft_server = HttpServer::new(move || {
        actix_web::App::new()
            .wrap(Logger::default())
            .app_data(raft_data.clone())
            .configure(raft::configure)
    })
    .bind(&config.raft_addr)
    .map_err(|source| StartupError::Bind {
        addr: config.raft_addr.clone(),
        source,
    })?
    .run();
    let raft_handle = raft_server.handle();

    bootstrap::bootstrap_cluster(&app_data, &config).await;

    let api_data = app_data.clone();
    let api_server = match HttpServer::new(move || {
        actix_web::App::new().wrap(Logger::default()).app_data(api_data.clone()).configure(api::configure)
    })
    .bind(&config.http_addr)
    {
        Ok(server) => server.run(),
        Err(source) => {
            raft_handle.stop(true).await;
            return Err(StartupError::Bind {
                addr: config.http_addr.clone(),
                source,
            });
        }
    };

    tracing::info!("serving raft on {} and users on {}", config.raft_addr, config.http_addr);
    tokio::try_join!(raft_server, api_server)?;

    if let Err(e) = app_data.shutdown().await {
        tracing::error!("failed to shut down raft: {}", e);
    }
    Ok(())
}
