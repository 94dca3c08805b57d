/**
 * Bindings to the external Crypt4GH engine.
 *  - A trait describing recryption and keypair generation
 *  - A subprocess backend for the `crypt4gh-recryptor` tool
 */
pub mod engine;
/**
 * Tracking of the compute node's rotating keypair:
 *  id derivation, expiration reporting and rotation.
 */
pub mod keypair;
/**
 * Content-addressed header storage with
 *  temporary-write-then-atomic-publish semantics.
 */
pub mod store;
/**
 * In-memory engine double for tests.
 */
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::engine::{CommandEngine, Engine, EngineError, KeygenJob, RecryptJob};
    pub use crate::keypair::{
        ComputeKeypairManager, KeypairError, KeypairId, KeypairInfo, PublicKeyMaterial,
    };
    pub use crate::store::{HeaderDigest, HeaderStore, PendingHeader, StoreError};
    pub use crate::version::build_info;
}
