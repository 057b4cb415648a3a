//! Storage layout of platform data.

use platform_store::{AuthenticatedStore, TransactionArg};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub const IDENTITIES: &[u8] = b"identities";
pub const CONTRACTS: &[u8] = b"contracts";
pub const DOCUMENTS: &[u8] = b"documents";
pub const POOLS: &[u8] = b"pools";
pub const EPOCHS: &[u8] = b"epochs";
pub const WITHDRAWALS: &[u8] = b"withdrawals";

/// Aux key of the persisted platform state.
pub const PLATFORM_STATE_KEY: &[u8] = b"platform_state";

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Reads and decodes one record.
pub fn fetch<T: DeserializeOwned>(
    store: &dyn AuthenticatedStore,
    path: &[&[u8]],
    key: &[u8],
    tx: TransactionArg,
) -> Result<Option<T>> {
    store
        .get(path, key, tx)?
        .map(|bytes| decode(&bytes))
        .transpose()
}

/// Encodes and writes one record.
pub fn save<T: Serialize>(
    store: &dyn AuthenticatedStore,
    path: &[&[u8]],
    key: &[u8],
    value: &T,
    tx: TransactionArg,
) -> Result<()> {
    store.insert(path, key, encode(value)?, tx)?;
    Ok(())
}
