//! User-side recryption of a single Crypt4GH header.
//!
//! A request flows through six steps: decode the submitted header, ingest
//! it into the header store, run the engine from the user's key to the
//! compute node's public key, publish the engine output into the store,
//! ask the compute node which keypair that public key belongs to, and
//! finally return the recrypted header along with the keypair binding.
//!
//! The compute public key is read exactly once per request. The same
//! snapshot is handed to the engine and sent to the compute node, so a
//! rotation landing mid-request can only ever surface as a mismatch, never
//! as a header bound to the wrong keypair id.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use common::engine::{Engine, EngineError, RecryptJob};
use common::keypair::{KeypairError, KeypairId, PublicKeyMaterial};
use common::store::{HeaderDigest, HeaderStore, StoreError};

/// What the compute node reports for a public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeKeyInfo {
    pub id: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyInfoError {
    #[error("key info request timed out")]
    Timeout,
    #[error("compute node unreachable: {0}")]
    Unreachable(String),
    #[error("compute node answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid key info response: {0}")]
    InvalidResponse(String),
}

/// Source of compute keypair bindings, normally the compute node's
/// `/get_compute_key_info` endpoint.
#[async_trait]
pub trait KeyInfoSource: Send + Sync + std::fmt::Debug {
    async fn compute_key_info(
        &self,
        public_key: &PublicKeyMaterial,
    ) -> Result<ComputeKeyInfo, KeyInfoError>;
}

/// Status the compute node answers with when the presented key is stale
const KEY_MISMATCH_STATUS: u16 = 409;

#[derive(Debug, thiserror::Error)]
pub enum RecryptError {
    #[error("invalid header: {0}")]
    Input(String),
    #[error("the header could not be decrypted with the user's private key")]
    Decryption,
    #[error("recryption engine failed: {0}")]
    Engine(EngineError),
    #[error("recryption engine did not finish within {0:?}")]
    EngineTimeout(Duration),
    #[error("compute key info request failed: {0}")]
    Network(KeyInfoError),
    #[error("compute key info request timed out")]
    NetworkTimeout,
    #[error("compute keypair mismatch: {0}")]
    Mismatch(String),
    #[error("header store error: {0}")]
    Storage(#[from] StoreError),
    #[error("compute public key unavailable: {0}")]
    ComputeKey(#[from] KeypairError),
}

impl From<EngineError> for RecryptError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Decryption { .. } => RecryptError::Decryption,
            other => RecryptError::Engine(other),
        }
    }
}

impl From<KeyInfoError> for RecryptError {
    fn from(err: KeyInfoError) -> Self {
        match err {
            KeyInfoError::Timeout => RecryptError::NetworkTimeout,
            KeyInfoError::Rejected { status, body } if status == KEY_MISMATCH_STATUS => {
                RecryptError::Mismatch(body)
            }
            other => RecryptError::Network(other),
        }
    }
}

/// Result of a successful recryption
#[derive(Debug, Clone)]
pub struct RecryptOutcome {
    pub input_digest: HeaderDigest,
    pub output_digest: HeaderDigest,
    pub header: Vec<u8>,
    pub keypair_id: KeypairId,
    pub expiration: DateTime<Utc>,
}

impl RecryptOutcome {
    pub fn encoded_header(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.header)
    }
}

#[derive(Debug, Clone)]
pub struct Recryptor {
    store: HeaderStore,
    engine: Arc<dyn Engine>,
    key_info: Arc<dyn KeyInfoSource>,
    user_private_key: PathBuf,
    compute_public_key: PathBuf,
    engine_timeout: Duration,
}

/// Private copy of the compute public key used for one request
struct KeySnapshot {
    material: PublicKeyMaterial,
    file: NamedTempFile,
}

impl Recryptor {
    pub fn new(
        store: HeaderStore,
        engine: Arc<dyn Engine>,
        key_info: Arc<dyn KeyInfoSource>,
        user_private_key: impl Into<PathBuf>,
        compute_public_key: impl Into<PathBuf>,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            key_info,
            user_private_key: user_private_key.into(),
            compute_public_key: compute_public_key.into(),
            engine_timeout,
        }
    }

    pub fn store(&self) -> &HeaderStore {
        &self.store
    }

    pub fn user_private_key(&self) -> &std::path::Path {
        &self.user_private_key
    }

    pub fn compute_public_key(&self) -> &std::path::Path {
        &self.compute_public_key
    }

    /// Recrypt a base64 encoded header for the compute node.
    #[tracing::instrument(skip_all)]
    pub async fn recrypt_header(&self, encoded: &str) -> Result<RecryptOutcome, RecryptError> {
        let ciphertext = decode_header(encoded)?;

        let input_digest = self.store.put(&ciphertext).await?;
        tracing::debug!(%input_digest, "header ingested");

        let target = self.snapshot_compute_key().await?;
        let input_path = self.store.path(&input_digest);
        let pending = self.store.put_pending()?;

        let job = RecryptJob {
            decryption_key: &self.user_private_key,
            encryption_key: target.file.path(),
            input: &input_path,
            output: pending.path(),
        };
        match tokio::time::timeout(self.engine_timeout, self.engine.recrypt(job)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(%input_digest, timeout = ?self.engine_timeout, "engine timed out");
                return Err(RecryptError::EngineTimeout(self.engine_timeout));
            }
        }

        let (output_digest, header) = self.store.publish(pending).await?;
        tracing::debug!(%output_digest, "recrypted header published");

        let expected = target.material.id();
        let info = self.key_info.compute_key_info(&target.material).await?;
        if info.id != expected.as_str() {
            tracing::warn!(
                expected = %expected,
                reported = %info.id,
                "compute node reported a different keypair"
            );
            return Err(RecryptError::Mismatch(format!(
                "header was encrypted for {} but the compute node reported {}",
                expected, info.id
            )));
        }

        tracing::info!(
            %input_digest,
            %output_digest,
            keypair_id = %expected,
            "header recrypted"
        );

        Ok(RecryptOutcome {
            input_digest,
            output_digest,
            header,
            keypair_id: expected,
            expiration: info.expiration,
        })
    }

    async fn snapshot_compute_key(&self) -> Result<KeySnapshot, RecryptError> {
        let armored = match tokio::fs::read_to_string(&self.compute_public_key).await {
            Ok(armored) => armored,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeypairError::MissingFile(self.compute_public_key.clone()).into())
            }
            Err(e) => return Err(KeypairError::Io(e).into()),
        };
        let material = PublicKeyMaterial::parse(&armored)?;

        let mut file = tempfile::Builder::new()
            .prefix(".compute-key-")
            .tempfile()
            .map_err(KeypairError::Io)?;
        file.write_all(armored.as_bytes())
            .and_then(|_| file.flush())
            .map_err(KeypairError::Io)?;

        Ok(KeySnapshot { material, file })
    }
}

fn decode_header(encoded: &str) -> Result<Vec<u8>, RecryptError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(RecryptError::Input("empty header".to_string()));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RecryptError::Input(format!("not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(RecryptError::Input("empty header".to_string()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use chrono::TimeZone;
    use common::engine::KeygenJob;
    use common::testkit::{open_header, seal_header, FakeBehavior, FakeEngine};

    use super::*;

    #[derive(Debug)]
    enum Answer {
        Current,
        Id(&'static str),
        Error(fn() -> KeyInfoError),
    }

    #[derive(Debug)]
    struct StubKeyInfo {
        answer: Answer,
        expiration: DateTime<Utc>,
        seen: Mutex<Vec<String>>,
    }

    impl StubKeyInfo {
        fn new(answer: Answer) -> Self {
            Self {
                answer,
                expiration: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl KeyInfoSource for StubKeyInfo {
        async fn compute_key_info(
            &self,
            public_key: &PublicKeyMaterial,
        ) -> Result<ComputeKeyInfo, KeyInfoError> {
            self.seen.lock().unwrap().push(public_key.as_str().to_string());
            let id = match &self.answer {
                Answer::Current => public_key.id().to_string(),
                Answer::Id(id) => id.to_string(),
                Answer::Error(err) => return Err(err()),
            };
            Ok(ComputeKeyInfo {
                id,
                expiration: self.expiration,
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        keys: PathBuf,
        store: HeaderStore,
    }

    async fn generate(engine: &FakeEngine, keys: &Path, name: &str) {
        engine
            .generate_keypair(KeygenJob {
                private_key: &keys.join(format!("{}.sec", name)),
                public_key: &keys.join(format!("{}.pub", name)),
                passphrase: None,
                comment: None,
            })
            .await
            .unwrap();
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys");
        std::fs::create_dir_all(&keys).unwrap();
        let engine = FakeEngine::new();
        generate(&engine, &keys, "user").await;
        generate(&engine, &keys, "compute").await;
        let store = HeaderStore::open(dir.path().join("headers")).await.unwrap();
        Fixture {
            _dir: dir,
            keys,
            store,
        }
    }

    fn recryptor(
        fx: &Fixture,
        engine: Arc<FakeEngine>,
        key_info: Arc<StubKeyInfo>,
        timeout: Duration,
    ) -> Recryptor {
        Recryptor::new(
            fx.store.clone(),
            engine,
            key_info,
            fx.keys.join("user.sec"),
            fx.keys.join("compute.pub"),
            timeout,
        )
    }

    fn user_header(fx: &Fixture, session_key: &[u8]) -> Vec<u8> {
        let user_public = std::fs::read_to_string(fx.keys.join("user.pub")).unwrap();
        seal_header(&user_public, session_key).unwrap()
    }

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn test_recrypts_for_compute_key() {
        let fx = fixture().await;
        let key_info = Arc::new(StubKeyInfo::new(Answer::Current));
        let recryptor = recryptor(
            &fx,
            Arc::new(FakeEngine::new()),
            key_info.clone(),
            Duration::from_secs(5),
        );

        let header = user_header(&fx, b"session-key");
        let outcome = recryptor.recrypt_header(&encode(&header)).await.unwrap();

        let compute_private = std::fs::read_to_string(fx.keys.join("compute.sec")).unwrap();
        assert_eq!(
            open_header(&compute_private, &outcome.header).unwrap(),
            b"session-key"
        );

        let compute_public = std::fs::read_to_string(fx.keys.join("compute.pub")).unwrap();
        let expected_id = PublicKeyMaterial::parse(&compute_public).unwrap().id();
        assert_eq!(outcome.keypair_id, expected_id);
        assert_eq!(outcome.expiration, key_info.expiration);
        assert_eq!(*key_info.seen.lock().unwrap(), vec![compute_public]);

        assert_eq!(outcome.input_digest, HeaderDigest::of(&header));
        assert_eq!(outcome.output_digest, HeaderDigest::of(&outcome.header));
        assert!(fx.store.contains(&outcome.input_digest).await.unwrap());
        assert!(fx.store.contains(&outcome.output_digest).await.unwrap());
        assert_eq!(outcome.encoded_header(), encode(&outcome.header));
    }

    #[tokio::test]
    async fn test_invalid_input_never_touches_store_or_engine() {
        let fx = fixture().await;
        let engine = Arc::new(FakeEngine::new());
        let recryptor = recryptor(
            &fx,
            engine.clone(),
            Arc::new(StubKeyInfo::new(Answer::Current)),
            Duration::from_secs(5),
        );

        for bad in ["", "   ", "not base64!!", "===="] {
            assert!(matches!(
                recryptor.recrypt_header(bad).await,
                Err(RecryptError::Input(_))
            ));
        }
        assert_eq!(engine.recrypt_calls(), 0);
        assert!(fx.store.digests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_header_is_a_decryption_error() {
        let fx = fixture().await;
        let key_info = Arc::new(StubKeyInfo::new(Answer::Current));
        let recryptor = recryptor(
            &fx,
            Arc::new(FakeEngine::new()),
            key_info.clone(),
            Duration::from_secs(5),
        );

        // sealed for the compute key, so the user key cannot open it
        let compute_public = std::fs::read_to_string(fx.keys.join("compute.pub")).unwrap();
        let header = seal_header(&compute_public, b"session-key").unwrap();

        assert!(matches!(
            recryptor.recrypt_header(&encode(&header)).await,
            Err(RecryptError::Decryption)
        ));
        assert_eq!(
            fx.store.digests().await.unwrap(),
            vec![HeaderDigest::of(&header)]
        );
        assert!(key_info.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failures() {
        let fx = fixture().await;
        let header = encode(&user_header(&fx, b"k"));

        let crashing = recryptor(
            &fx,
            Arc::new(FakeEngine::with_behavior(FakeBehavior::Exit(2))),
            Arc::new(StubKeyInfo::new(Answer::Current)),
            Duration::from_secs(5),
        );
        assert!(matches!(
            crashing.recrypt_header(&header).await,
            Err(RecryptError::Engine(EngineError::Failed { code: Some(2), .. }))
        ));

        let hanging = recryptor(
            &fx,
            Arc::new(FakeEngine::with_behavior(FakeBehavior::Hang)),
            Arc::new(StubKeyInfo::new(Answer::Current)),
            Duration::from_millis(50),
        );
        assert!(matches!(
            hanging.recrypt_header(&header).await,
            Err(RecryptError::EngineTimeout(_))
        ));

        // only the submitted header made it into the store
        assert_eq!(fx.store.digests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reported_id_must_match_snapshot() {
        let fx = fixture().await;
        let recryptor = recryptor(
            &fx,
            Arc::new(FakeEngine::new()),
            Arc::new(StubKeyInfo::new(Answer::Id("cn:00000000"))),
            Duration::from_secs(5),
        );

        let header = encode(&user_header(&fx, b"k"));
        assert!(matches!(
            recryptor.recrypt_header(&header).await,
            Err(RecryptError::Mismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_key_info_errors() {
        let fx = fixture().await;
        let header = encode(&user_header(&fx, b"k"));

        let cases: [(fn() -> KeyInfoError, fn(&RecryptError) -> bool); 3] = [
            (
                || KeyInfoError::Timeout,
                |e| matches!(e, RecryptError::NetworkTimeout),
            ),
            (
                || KeyInfoError::Unreachable("connection refused".to_string()),
                |e| matches!(e, RecryptError::Network(_)),
            ),
            (
                || KeyInfoError::Rejected {
                    status: 409,
                    body: "stale key".to_string(),
                },
                |e| matches!(e, RecryptError::Mismatch(_)),
            ),
        ];

        for (answer, check) in cases {
            let recryptor = recryptor(
                &fx,
                Arc::new(FakeEngine::new()),
                Arc::new(StubKeyInfo::new(Answer::Error(answer))),
                Duration::from_secs(5),
            );
            let err = recryptor.recrypt_header(&header).await.unwrap_err();
            assert!(check(&err), "unexpected error {:?}", err);
        }
    }

    #[tokio::test]
    async fn test_missing_compute_key() {
        let fx = fixture().await;
        std::fs::remove_file(fx.keys.join("compute.pub")).unwrap();
        let engine = Arc::new(FakeEngine::new());
        let recryptor = recryptor(
            &fx,
            engine.clone(),
            Arc::new(StubKeyInfo::new(Answer::Current)),
            Duration::from_secs(5),
        );

        let header = encode(&user_header(&fx, b"k"));
        assert!(matches!(
            recryptor.recrypt_header(&header).await,
            Err(RecryptError::ComputeKey(KeypairError::MissingFile(_)))
        ));
        assert_eq!(engine.recrypt_calls(), 0);
    }
}
