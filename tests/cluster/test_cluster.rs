use std::thread;
use std::time::Duration;
use std::time::Instant;

use raft_userstore::network::api::ErrorBody;
use raft_userstore::network::api::UserBody;
use raft_userstore::start_user_node;
use raft_userstore::store::StoreInfo;
use reqwest::StatusCode;

use crate::fixtures::cluster_node_config;

const RAFT_ADDRS: [&str; 3] = ["127.0.0.1:39411", "127.0.0.1:39412", "127.0.0.1:39413"];
const HTTP_ADDRS: [&str; 3] = ["127.0.0.1:39421", "127.0.0.1:39422", "127.0.0.1:39423"];

async fn is_leader(client: &reqwest::Client, http_addr: &str) -> bool {
    let url = format!("http://{}/api/v1/users/store", http_addr);
    match client.get(url).send().await {
        Ok(resp) => resp.json::<StoreInfo>().await.map(|info| info.leader).unwrap_or(false),
        Err(_) => false,
    }
}

/// Writes `username` through whichever node is leader, returning its index.
async fn set_on_leader(client: &reqwest::Client, username: &str, password: &str) -> anyhow::Result<usize> {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        for (i, addr) in HTTP_ADDRS.iter().enumerate() {
            if !is_leader(client, addr).await {
                continue;
            }
            let url = format!("http://{}/api/v1/users/?username={}&password={}", addr, username, password);
            let resp = client.post(url).send().await?;
            if resp.status() == StatusCode::CREATED {
                return Ok(i);
            }
        }
        if Instant::now() >= deadline {
            anyhow::bail!("no leader accepted the write of {}", username);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn wait_for_user(client: &reqwest::Client, http_addr: &str, username: &str) -> anyhow::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let url = format!("http://{}/api/v1/users/?username={}", http_addr, username);
    loop {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status() == StatusCode::OK {
                let body: UserBody = resp.json().await?;
                assert_eq!(username, body.username);
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            anyhow::bail!("{} never replicated to {}", username, http_addr);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Three nodes bootstrapped from the same server list elect one leader,
/// replicate its writes to the others and refuse writes on followers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_node_cluster() -> anyhow::Result<()> {
    let bootstrap_servers = RAFT_ADDRS.join(",");

    // The directories must outlive the node threads.
    let mut dirs = Vec::new();
    for (raft_addr, http_addr) in RAFT_ADDRS.iter().zip(HTTP_ADDRS) {
        let td = tempfile::TempDir::new()?;
        let config = cluster_node_config(td.path(), raft_addr, http_addr, &bootstrap_servers)?;
        dirs.push(td);

        thread::spawn(move || {
            let res = actix_web::rt::System::new().block_on(start_user_node(config));
            println!("node stopped: {:?}", res);
        });
    }

    let client = reqwest::Client::new();

    let leader = set_on_leader(&client, "bob", "pw1").await?;
    for addr in HTTP_ADDRS {
        wait_for_user(&client, addr, "bob").await?;
    }

    let leaders = {
        let mut n = 0;
        for addr in HTTP_ADDRS {
            if is_leader(&client, addr).await {
                n += 1;
            }
        }
        n
    };
    assert_eq!(1, leaders);

    let follower = HTTP_ADDRS[(leader + 1) % HTTP_ADDRS.len()];
    assert!(!is_leader(&client, follower).await);

    let resp = client
        .post(format!("http://{}/api/v1/users/?username=carol&password=pw2", follower))
        .send()
        .await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());
    let body: ErrorBody = resp.json().await?;
    assert_eq!("not the leader", body.error);

    let resp = client.get(format!("http://{}/api/v1/users/?username=carol", follower)).send().await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());

    Ok(())
}
