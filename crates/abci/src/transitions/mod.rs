//! State transitions delivered in blocks.
//!
//! A transition arrives as the bincode encoding of a
//! [`StateTransitionEnvelope`]. Failures are reported as [`ResultCode`]s and
//! never abort the block.

mod executor;

pub use executor::{TransitionExecutor, TransitionResult};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contracts::DataContract;
use crate::types::{hex_bytes, Identifier};

/// Outcome code of a delivered transition. `Ok` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResultCode {
    Ok = 0,
    InvalidEncoding = 1,
    TransitionTooLarge = 2,
    UnsupportedProtocolVersion = 3,
    IdentityNotFound = 4,
    InsufficientBalance = 5,
    DataContractAlreadyPresent = 6,
    DataContractNotPresent = 7,
    InvalidDataContractVersion = 8,
    DataContractOwnerMismatch = 9,
    InvalidDocumentType = 10,
    DuplicateDocumentTransitions = 11,
    DocumentAlreadyPresent = 12,
    DocumentNotFound = 13,
    DocumentOwnerMismatch = 14,
}

impl ResultCode {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// How a withdrawal may be batched on the core chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pooling {
    #[default]
    Never,
    IfAvailable,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentAction {
    Create { properties: BTreeMap<String, String> },
    Replace { properties: BTreeMap<String, String> },
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTransition {
    pub id: Identifier,
    pub data_contract_id: Identifier,
    pub document_type: String,
    pub action: DocumentAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateTransition {
    DataContractCreate {
        data_contract: DataContract,
    },
    /// The contract's version must be exactly one above the stored one.
    DataContractUpdate {
        data_contract: DataContract,
    },
    DocumentsBatch {
        owner_id: Identifier,
        transitions: Vec<DocumentTransition>,
    },
    IdentityTopUp {
        identity_id: Identifier,
        amount: u64,
    },
    IdentityCreditWithdrawal {
        identity_id: Identifier,
        amount: u64,
        core_fee_per_byte: u32,
        pooling: Pooling,
        #[serde(with = "hex_bytes")]
        output_script: Vec<u8>,
    },
}

impl StateTransition {
    pub fn type_name(&self) -> &'static str {
        match self {
            StateTransition::DataContractCreate { .. } => "dataContractCreate",
            StateTransition::DataContractUpdate { .. } => "dataContractUpdate",
            StateTransition::DocumentsBatch { .. } => "documentsBatch",
            StateTransition::IdentityTopUp { .. } => "identityTopUp",
            StateTransition::IdentityCreditWithdrawal { .. } => "identityCreditWithdrawal",
        }
    }

    /// Identity paying the fee.
    pub fn owner_id(&self) -> Identifier {
        match self {
            StateTransition::DataContractCreate { data_contract }
            | StateTransition::DataContractUpdate { data_contract } => data_contract.owner_id,
            StateTransition::DocumentsBatch { owner_id, .. } => *owner_id,
            StateTransition::IdentityTopUp { identity_id, .. }
            | StateTransition::IdentityCreditWithdrawal { identity_id, .. } => *identity_id,
        }
    }
}

/// Wire form of a transition. The signature is carried but not checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitionEnvelope {
    pub protocol_version: u32,
    pub transition: StateTransition,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl StateTransitionEnvelope {
    pub fn new(protocol_version: u32, transition: StateTransition) -> Self {
        Self {
            protocol_version,
            transition,
            signature: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        crate::storage::encode(self)
    }
}

/// A queued credit withdrawal, stored under `[withdrawals]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub identity_id: Identifier,
    pub amount: u64,
    pub core_fee_per_byte: u32,
    pub pooling: Pooling,
    pub output_script: Vec<u8>,
    pub queued_at_height: u64,
}
