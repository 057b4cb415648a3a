//! Identities registered on the platform.

use platform_store::{AuthenticatedStore, TransactionArg};
use serde::{Deserialize, Serialize};

use crate::core_chain::MasternodeEntry;
use crate::error::Result;
use crate::storage::{self, IDENTITIES};
use crate::types::{hex_bytes, Identifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityStatus {
    Active,
    /// Masternode is listed but PoSe-banned.
    Banned,
    /// Masternode left the list. The record is kept as a tombstone.
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPurpose {
    Operator,
    Voting,
    Payout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPublicKey {
    pub id: u32,
    pub purpose: KeyPurpose,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Identifier,
    pub public_keys: Vec<IdentityPublicKey>,
    pub balance: u64,
    pub revision: u64,
    pub status: IdentityStatus,
}

impl Identity {
    /// Identity representing a listed masternode, keyed by its pro_tx_hash.
    pub fn from_masternode(entry: &MasternodeEntry) -> Self {
        Self {
            id: entry.pro_tx_hash,
            public_keys: masternode_keys(entry),
            balance: 0,
            revision: 0,
            status: if entry.is_valid {
                IdentityStatus::Active
            } else {
                IdentityStatus::Banned
            },
        }
    }

    /// Takes keys and status from `incoming`, keeps the balance and bumps the
    /// revision.
    pub fn apply_masternode_change(&mut self, incoming: &Identity) {
        self.public_keys = incoming.public_keys.clone();
        self.status = incoming.status;
        self.revision += 1;
    }

    pub fn mark_removed(&mut self) {
        self.status = IdentityStatus::Removed;
        self.revision += 1;
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    pub fn fetch(
        store: &dyn AuthenticatedStore,
        id: &Identifier,
        tx: TransactionArg,
    ) -> Result<Option<Identity>> {
        storage::fetch(store, &[IDENTITIES], id.as_ref(), tx)
    }

    pub fn save(&self, store: &dyn AuthenticatedStore, tx: TransactionArg) -> Result<()> {
        storage::save(store, &[IDENTITIES], self.id.as_ref(), self, tx)
    }
}

fn masternode_keys(entry: &MasternodeEntry) -> Vec<IdentityPublicKey> {
    vec![
        IdentityPublicKey {
            id: 0,
            purpose: KeyPurpose::Operator,
            data: entry.operator_public_key.clone(),
        },
        IdentityPublicKey {
            id: 1,
            purpose: KeyPurpose::Voting,
            data: entry.voting_address.clone(),
        },
        IdentityPublicKey {
            id: 2,
            purpose: KeyPurpose::Payout,
            data: entry.payout_address.clone(),
        },
    ]
}
