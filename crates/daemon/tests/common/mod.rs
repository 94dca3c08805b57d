#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use url::Url;

use common::engine::{Engine, KeygenJob};
use common::keypair::{ComputeKeypairManager, KeypairMetadata};
use common::store::HeaderStore;
use common::testkit::{seal_header, FakeBehavior, FakeEngine};
use recryptor_service::http_server::api::client::ApiClient;
use recryptor_service::http_server::{self, compute_router, user_router};
use recryptor_service::{ComputeState, Recryptor, UserState};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A user node and a compute node talking over loopback, sharing one
/// fake engine.
pub struct Nodes {
    _dir: TempDir,
    pub user_keys: PathBuf,
    pub compute_keys: PathBuf,
    pub engine: Arc<FakeEngine>,
    pub keypairs: ComputeKeypairManager,
    pub store: HeaderStore,
    pub user: ApiClient,
    pub compute: ApiClient,
    compute_shutdown: watch::Sender<()>,
    user_shutdown: watch::Sender<()>,
}

pub async fn generate(engine: &FakeEngine, private_key: &Path, public_key: &Path) {
    engine
        .generate_keypair(KeygenJob {
            private_key,
            public_key,
            passphrase: None,
            comment: None,
        })
        .await
        .unwrap();
}

pub async fn serve(router: axum::Router) -> (SocketAddr, watch::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, mut rx) = watch::channel(());
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.changed().await;
            })
            .await
            .unwrap();
    });
    (addr, tx)
}

/// A compute node that accepts connections and never answers
pub async fn silent_node() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

pub fn http_config(addr: SocketAddr) -> http_server::Config {
    http_server::Config::new(addr, tracing::Level::DEBUG)
}

impl Nodes {
    pub async fn spawn() -> Self {
        Self::spawn_with(FakeBehavior::Recrypt, true).await
    }

    pub async fn spawn_with(behavior: FakeBehavior, verify_public_key: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let user_keys = dir.path().join("user-keys");
        let compute_keys = dir.path().join("compute-keys");
        std::fs::create_dir_all(&user_keys).unwrap();

        // keys are generated with a working engine whatever the canned behavior
        let keygen = FakeEngine::new();
        generate(
            &keygen,
            &user_keys.join("user.sec"),
            &user_keys.join("user.pub"),
        )
        .await;

        let keypairs = ComputeKeypairManager::new(
            compute_keys.join("compute.sec"),
            compute_keys.join("compute.pub"),
            compute_keys.join("compute.keypair.toml"),
        );
        keypairs
            .rotate(&keygen, chrono::Duration::hours(1), None, None)
            .await
            .unwrap();

        let compute_state = ComputeState::new(keypairs.clone(), verify_public_key);
        let placeholder: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let (compute_addr, compute_shutdown) =
            serve(compute_router(compute_state, &http_config(placeholder))).await;
        let compute_url = Url::parse(&format!("http://{}", compute_addr)).unwrap();

        let engine = Arc::new(FakeEngine::with_behavior(behavior));
        let store = HeaderStore::open(dir.path().join("headers")).await.unwrap();
        let key_info = ApiClient::with_options(&compute_url, None, Some(TIMEOUT)).unwrap();
        let recryptor = Recryptor::new(
            store.clone(),
            engine.clone(),
            Arc::new(key_info),
            user_keys.join("user.sec"),
            user_keys.join("compute.pub"),
            TIMEOUT,
        );
        let (user_addr, user_shutdown) = serve(user_router(
            UserState::new(recryptor),
            &http_config(placeholder),
        ))
        .await;
        let user_url = Url::parse(&format!("http://{}", user_addr)).unwrap();

        let nodes = Self {
            _dir: dir,
            user_keys,
            compute_keys,
            engine,
            keypairs,
            store,
            user: ApiClient::with_options(&user_url, None, Some(TIMEOUT)).unwrap(),
            compute: ApiClient::with_options(&compute_url, None, Some(TIMEOUT)).unwrap(),
            compute_shutdown,
            user_shutdown,
        };
        nodes.distribute_compute_key();
        nodes
    }

    /// Copy the compute node's current public key to the user node
    pub fn distribute_compute_key(&self) {
        std::fs::copy(
            self.compute_keys.join("compute.pub"),
            self.user_keys.join("compute.pub"),
        )
        .unwrap();
    }

    pub fn user_public_key(&self) -> String {
        std::fs::read_to_string(self.user_keys.join("user.pub")).unwrap()
    }

    pub fn compute_public_key(&self) -> String {
        std::fs::read_to_string(self.compute_keys.join("compute.pub")).unwrap()
    }

    pub fn compute_private_key(&self) -> String {
        std::fs::read_to_string(self.compute_keys.join("compute.sec")).unwrap()
    }

    /// A header the user node is able to open
    pub fn user_header(&self, session_key: &[u8]) -> Vec<u8> {
        seal_header(&self.user_public_key(), session_key).unwrap()
    }

    pub async fn rotate(&self) {
        self.keypairs
            .rotate(&FakeEngine::new(), chrono::Duration::hours(1), None, None)
            .await
            .unwrap();
    }

    /// Pin the current keypair's expiration to `expiration`
    pub async fn set_expiration(&self, expiration: DateTime<Utc>) {
        let info = self.keypairs.current_keypair_info().await.unwrap();
        let metadata = KeypairMetadata {
            id: info.id,
            expiration_date: expiration,
            created_at: expiration - chrono::Duration::hours(1),
        };
        std::fs::write(
            self.keypairs.metadata_path(),
            toml::to_string_pretty(&metadata).unwrap(),
        )
        .unwrap();
    }

    pub fn stop_compute(&self) {
        let _ = self.compute_shutdown.send(());
    }
}

impl Drop for Nodes {
    fn drop(&mut self) {
        let _ = self.compute_shutdown.send(());
        let _ = self.user_shutdown.send(());
    }
}
