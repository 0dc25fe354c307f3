//! Raft RPC endpoints, served on the raft address.
//!
//! Each handler answers with the engine's `Result` serialized as JSON, which
//! is what [`Network`](crate::network::Network) decodes on the calling side.

use actix_web::post;
use actix_web::web;
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::Responder;
use openraft::raft::AppendEntriesRequest;
use openraft::raft::InstallSnapshotRequest;
use openraft::raft::VoteRequest;

use crate::app::App;
use crate::NodeId;
use crate::TypeConfig;

/// Largest RPC body accepted, enough for one snapshot chunk plus framing.
const PAYLOAD_LIMIT: usize = 16 * 1024 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(PAYLOAD_LIMIT))
        .service(vote)
        .service(append)
        .service(install_snapshot);
}

#[post("/raft-vote")]
pub async fn vote(app: Data<App>, req: Json<VoteRequest<NodeId>>) -> impl Responder {
    let req = req.into_inner();
    tracing::debug!("node {} received vote request: {:?}", app.id, req.vote);

    let res = app.raft.vote(req).await;
    if let Err(e) = &res {
        tracing::warn!("vote request failed: {}", e);
    }
    Json(res)
}

#[post("/raft-append")]
pub async fn append(app: Data<App>, req: Json<AppendEntriesRequest<TypeConfig>>) -> impl Responder {
    let req = req.into_inner();
    tracing::trace!(
        "node {} received {} entries after {:?}",
        app.id,
        req.entries.len(),
        req.prev_log_id
    );

    let res = app.raft.append_entries(req).await;
    if let Err(e) = &res {
        tracing::warn!("append entries failed: {}", e);
    }
    Json(res)
}

#[post("/raft-snapshot")]
pub async fn install_snapshot(app: Data<App>, req: Json<InstallSnapshotRequest<TypeConfig>>) -> impl Responder {
    let req = req.into_inner();
    tracing::info!(
        "node {} receiving snapshot {} at offset {}, done: {}",
        app.id,
        req.meta.snapshot_id,
        req.offset,
        req.done
    );

    let res = app.raft.install_snapshot(req).await;
    if let Err(e) = &res {
        tracing::warn!("install snapshot failed: {}", e);
    }
    Json(res)
}
