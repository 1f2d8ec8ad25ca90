//! Persistent server identity.
//!
//! Three secrets live in the store's identity table:
//!
//! - `rpc-seed`: 32 bytes; agreement and signing keys derive from it
//! - `dht-seed`: 32 bytes; the discovery node id is the Ed25519 public key
//!   derived from it
//! - `server-public-key`: agreement public key, checked against `rpc-seed`
//!
//! Missing entries are generated on first start. A stored public key that
//! does not match the seed aborts startup.

use tickwire_core::{EndpointIdentity, Environment};
use tickwire_crypto::SigningKeyPair;
use zeroize::Zeroizing;

use crate::{error::ServerError, storage::Store};

/// Name of the RPC identity seed.
pub const RPC_SEED: &str = "rpc-seed";
/// Name of the discovery node seed.
pub const DHT_SEED: &str = "dht-seed";
/// Name of the recorded agreement public key.
pub const SERVER_PUBLIC_KEY: &str = "server-public-key";

/// Identity material loaded at startup.
#[derive(Debug)]
pub struct ServerIdentity {
    /// RPC key material
    pub endpoint: EndpointIdentity,
    /// Discovery node seed
    pub dht_seed: Zeroizing<[u8; 32]>,
}

impl ServerIdentity {
    /// Id the server announces itself under in discovery.
    pub fn node_id(&self) -> [u8; 32] {
        SigningKeyPair::from_seed(*self.dht_seed).public_key()
    }
}

/// Load the identity from `store`, creating missing pieces.
///
/// # Errors
///
/// - `Identity` if a seed has the wrong length or the stored public key
///   does not match the seed
/// - `Storage` if the identity table cannot be read or written
pub fn load_or_create<S: Store, E: Environment>(
    store: &S,
    env: &E,
) -> Result<ServerIdentity, ServerError> {
    let rpc_seed = load_or_create_seed(store, env, RPC_SEED)?;
    let dht_seed = load_or_create_seed(store, env, DHT_SEED)?;
    let endpoint = EndpointIdentity::from_seed(&rpc_seed);
    let public_key = endpoint.public_key();

    match store.load_secret(SERVER_PUBLIC_KEY)? {
        Some(stored) if stored.as_slice() == public_key.as_slice() => {},
        Some(stored) => {
            return Err(ServerError::Identity(format!(
                "stored public key {} does not match {RPC_SEED} (derives {})",
                hex::encode(stored),
                hex::encode(public_key)
            )));
        },
        None => store.store_secret(SERVER_PUBLIC_KEY, &public_key)?,
    }

    tracing::info!(public_key = %hex::encode(public_key), "server identity loaded");
    Ok(ServerIdentity { endpoint, dht_seed })
}

fn load_or_create_seed<S: Store, E: Environment>(
    store: &S,
    env: &E,
    name: &str,
) -> Result<Zeroizing<[u8; 32]>, ServerError> {
    let mut seed = Zeroizing::new([0u8; 32]);

    match store.load_secret(name)? {
        Some(stored) => {
            let stored = Zeroizing::new(stored);
            if stored.len() != seed.len() {
                return Err(ServerError::Identity(format!(
                    "{name} has {} bytes, expected {}",
                    stored.len(),
                    seed.len()
                )));
            }
            seed.copy_from_slice(&stored);
        },
        None => {
            env.random_bytes(seed.as_mut_slice());
            store.store_secret(name, seed.as_slice())?;
            tracing::info!(name, "generated new seed");
        },
    }

    Ok(seed)
}
