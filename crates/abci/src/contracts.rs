//! Data contracts, documents and the system contracts created at genesis.

use std::collections::{BTreeMap, BTreeSet};

use platform_store::{AuthenticatedStore, TransactionArg};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block_info::BlockInfo;
use crate::error::Result;
use crate::storage::{self, CONTRACTS, DOCUMENTS};
use crate::types::{Bytes32, Identifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataContract {
    pub id: Identifier,
    pub owner_id: Identifier,
    pub version: u32,
    pub document_types: BTreeSet<String>,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl DataContract {
    pub fn has_document_type(&self, document_type: &str) -> bool {
        self.document_types.contains(document_type)
    }

    pub fn fetch(
        store: &dyn AuthenticatedStore,
        id: &Identifier,
        tx: TransactionArg,
    ) -> Result<Option<DataContract>> {
        storage::fetch(store, &[CONTRACTS], id.as_ref(), tx)
    }

    pub fn save(&self, store: &dyn AuthenticatedStore, tx: TransactionArg) -> Result<()> {
        storage::save(store, &[CONTRACTS], self.id.as_ref(), self, tx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Identifier,
    pub owner_id: Identifier,
    pub revision: u64,
    pub properties: BTreeMap<String, String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Document {
    pub fn fetch(
        store: &dyn AuthenticatedStore,
        contract_id: &Identifier,
        document_type: &str,
        id: &Identifier,
        tx: TransactionArg,
    ) -> Result<Option<Document>> {
        storage::fetch(
            store,
            &[DOCUMENTS, contract_id.as_ref(), document_type.as_bytes()],
            id.as_ref(),
            tx,
        )
    }

    pub fn save(
        &self,
        store: &dyn AuthenticatedStore,
        contract_id: &Identifier,
        document_type: &str,
        tx: TransactionArg,
    ) -> Result<()> {
        storage::save(
            store,
            &[DOCUMENTS, contract_id.as_ref(), document_type.as_bytes()],
            self.id.as_ref(),
            self,
            tx,
        )
    }

    pub fn delete(
        store: &dyn AuthenticatedStore,
        contract_id: &Identifier,
        document_type: &str,
        id: &Identifier,
        tx: TransactionArg,
    ) -> Result<bool> {
        Ok(store.delete(
            &[DOCUMENTS, contract_id.as_ref(), document_type.as_bytes()],
            id.as_ref(),
            tx,
        )?)
    }
}

/// Owner of every system contract.
pub const SYSTEM_OWNER_ID: Identifier = Bytes32::ZERO;

pub const DPNS_CONTRACT_ID: Identifier = Bytes32::new([
    0x51, 0x71, 0xf5, 0x6a, 0x6a, 0x6a, 0x26, 0x0a, 0x9c, 0x2b, 0x42, 0x49, 0xbb, 0xe4, 0x4a, 0xbf,
    0xbd, 0x47, 0x2d, 0x24, 0xe4, 0x06, 0x38, 0x0f, 0xd7, 0xe5, 0x2f, 0x7d, 0xe8, 0xb7, 0x8d, 0x23,
]);

pub const DASHPAY_CONTRACT_ID: Identifier = Bytes32::new([
    0x30, 0x9d, 0xa5, 0xf5, 0xc6, 0x29, 0x53, 0x17, 0x67, 0xd5, 0xe1, 0xaa, 0x85, 0x5c, 0xa1, 0x40,
    0x1a, 0xa7, 0x73, 0xe8, 0x59, 0x55, 0x29, 0x4f, 0x01, 0x3a, 0x8a, 0xcf, 0xad, 0xd7, 0xd5, 0x55,
]);

pub const FEATURE_FLAGS_CONTRACT_ID: Identifier = Bytes32::new([
    0x12, 0xc6, 0x71, 0xc0, 0xa1, 0xaf, 0x10, 0x86, 0xfd, 0x6d, 0x9d, 0x91, 0x4c, 0x63, 0x42, 0xf3,
    0xf7, 0x30, 0x6a, 0x32, 0xac, 0xac, 0xd0, 0x53, 0x37, 0xaa, 0xd6, 0x39, 0x11, 0x12, 0xe7, 0xa0,
]);

pub const MASTERNODE_REWARD_SHARES_CONTRACT_ID: Identifier = Bytes32::new([
    0x0c, 0xac, 0xe2, 0x05, 0x24, 0x66, 0x93, 0xa7, 0xc8, 0x15, 0x65, 0x23, 0x62, 0x0d, 0xaa, 0x93,
    0x7d, 0x2f, 0x22, 0x47, 0x93, 0x44, 0x63, 0xee, 0xb0, 0x1f, 0xf7, 0x21, 0x95, 0x90, 0x95, 0x8c,
]);

pub const WITHDRAWALS_CONTRACT_ID: Identifier = Bytes32::new([
    0x08, 0xd6, 0x07, 0x0d, 0xbd, 0xdf, 0xb5, 0x52, 0x08, 0xdd, 0xf6, 0xd3, 0x11, 0xe9, 0x7e, 0xe5,
    0x01, 0xe0, 0x72, 0x9e, 0x63, 0xa2, 0x78, 0x20, 0xaa, 0xac, 0xda, 0x9e, 0xa5, 0x1b, 0xcc, 0xf2,
]);

pub const REWARD_SHARE_DOCUMENT_TYPE: &str = "rewardShare";

/// The contracts present in every genesis state.
pub fn system_contracts(block_info: &BlockInfo) -> Vec<DataContract> {
    let contract = |id: Identifier, document_types: &[&str]| DataContract {
        id,
        owner_id: SYSTEM_OWNER_ID,
        version: 1,
        document_types: document_types.iter().map(|t| t.to_string()).collect(),
        created_at_ms: block_info.time_ms(),
    };

    vec![
        contract(DPNS_CONTRACT_ID, &["domain", "preorder"]),
        contract(
            DASHPAY_CONTRACT_ID,
            &["profile", "contactInfo", "contactRequest"],
        ),
        contract(
            FEATURE_FLAGS_CONTRACT_ID,
            &["updateConsensusParams"],
        ),
        contract(
            MASTERNODE_REWARD_SHARES_CONTRACT_ID,
            &[REWARD_SHARE_DOCUMENT_TYPE],
        ),
        contract(WITHDRAWALS_CONTRACT_ID, &["withdrawal"]),
    ]
}

/// Writes the system contracts through `tx`.
pub fn register_system_contracts(
    store: &dyn AuthenticatedStore,
    tx: TransactionArg,
    block_info: &BlockInfo,
) -> Result<()> {
    for contract in system_contracts(block_info) {
        debug!(contract_id = %contract.id, "registering system data contract");
        contract.save(store, tx)?;
    }
    Ok(())
}
