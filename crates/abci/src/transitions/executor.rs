use std::collections::{BTreeMap, BTreeSet};

use bincode::Options;
use platform_store::{AuthenticatedStore, TransactionArg};
use tracing::{debug, trace};

use super::{
    DocumentAction, DocumentTransition, ResultCode, StateTransition, StateTransitionEnvelope,
    WithdrawalRecord,
};
use crate::block_info::BlockInfo;
use crate::contracts::{DataContract, Document};
use crate::error::Result;
use crate::fees::transition_fee;
use crate::identity::{Identity, IdentityStatus};
use crate::storage::{self, WITHDRAWALS};
use crate::types::{sha256, Bytes32, Identifier};

/// Outcome of one delivered transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub code: ResultCode,
    pub hash: Bytes32,
    /// Credits charged; zero when rejected.
    pub fee: u64,
    pub transition_type: Option<&'static str>,
    pub info: String,
}

impl TransitionResult {
    fn rejected(hash: Bytes32, code: ResultCode, info: impl Into<String>) -> Self {
        Self {
            code,
            hash,
            fee: 0,
            transition_type: None,
            info: info.into(),
        }
    }
}

type Rejection = (ResultCode, String);

fn reject<T>(code: ResultCode, info: impl Into<String>) -> Result<std::result::Result<T, Rejection>> {
    Ok(Err((code, info.into())))
}

/// Validates and applies transitions inside the open block transaction.
///
/// Every check runs before the first write, so a rejected transition leaves
/// no partial state behind. Only storage failures surface as `Err`.
pub struct TransitionExecutor {
    protocol_version: u32,
    max_size: usize,
}

impl TransitionExecutor {
    pub fn new(protocol_version: u32, max_size: usize) -> Self {
        Self {
            protocol_version,
            max_size,
        }
    }

    pub fn execute(
        &self,
        store: &dyn AuthenticatedStore,
        tx: TransactionArg,
        block_info: &BlockInfo,
        raw: &[u8],
    ) -> Result<TransitionResult> {
        let hash = sha256(&[raw]);

        if raw.len() > self.max_size {
            return Ok(TransitionResult::rejected(
                hash,
                ResultCode::TransitionTooLarge,
                format!("{} bytes exceeds the limit of {}", raw.len(), self.max_size),
            ));
        }

        let envelope: StateTransitionEnvelope = match decode_envelope(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                return Ok(TransitionResult::rejected(
                    hash,
                    ResultCode::InvalidEncoding,
                    err.to_string(),
                ))
            }
        };

        if envelope.protocol_version != self.protocol_version {
            return Ok(TransitionResult::rejected(
                hash,
                ResultCode::UnsupportedProtocolVersion,
                format!(
                    "protocol version {} is not supported, expected {}",
                    envelope.protocol_version, self.protocol_version
                ),
            ));
        }

        let transition = envelope.transition;
        let fee = transition_fee(raw.len());
        let context = ApplyContext {
            store,
            tx,
            block_info,
            fee,
        };

        let outcome = match &transition {
            StateTransition::DataContractCreate { data_contract } => {
                context.create_contract(data_contract)?
            }
            StateTransition::DataContractUpdate { data_contract } => {
                context.update_contract(data_contract)?
            }
            StateTransition::DocumentsBatch {
                owner_id,
                transitions,
            } => context.apply_documents(owner_id, transitions)?,
            StateTransition::IdentityTopUp {
                identity_id,
                amount,
            } => context.top_up(identity_id, *amount)?,
            StateTransition::IdentityCreditWithdrawal { .. } => context.withdraw(&transition)?,
        };

        Ok(match outcome {
            Ok(()) => {
                trace!(
                    transition = transition.type_name(),
                    hash = %hash,
                    fee,
                    "state transition applied"
                );
                TransitionResult {
                    code: ResultCode::Ok,
                    hash,
                    fee,
                    transition_type: Some(transition.type_name()),
                    info: String::new(),
                }
            }
            Err((code, info)) => {
                debug!(
                    transition = transition.type_name(),
                    hash = %hash,
                    %code,
                    %info,
                    "state transition rejected"
                );
                TransitionResult {
                    transition_type: Some(transition.type_name()),
                    ..TransitionResult::rejected(hash, code, info)
                }
            }
        })
    }
}

struct ApplyContext<'a> {
    store: &'a dyn AuthenticatedStore,
    tx: TransactionArg<'a>,
    block_info: &'a BlockInfo,
    fee: u64,
}

impl ApplyContext<'_> {
    /// Loads the paying identity and checks it can cover `fee + extra`.
    fn payer(&self, id: &Identifier, extra: u64) -> Result<std::result::Result<Identity, Rejection>> {
        let identity = match Identity::fetch(self.store, id, self.tx)? {
            Some(identity) if identity.status != IdentityStatus::Removed => identity,
            _ => return reject(ResultCode::IdentityNotFound, format!("identity {id} not found")),
        };
        let required = self.fee.saturating_add(extra);
        if identity.balance < required {
            return reject(
                ResultCode::InsufficientBalance,
                format!("balance {} is below required {}", identity.balance, required),
            );
        }
        Ok(Ok(identity))
    }

    fn charge(&self, mut identity: Identity, extra: u64) -> Result<()> {
        identity.balance -= self.fee.saturating_add(extra);
        identity.save(self.store, self.tx)
    }

    fn create_contract(&self, contract: &DataContract) -> Result<std::result::Result<(), Rejection>> {
        if DataContract::fetch(self.store, &contract.id, self.tx)?.is_some() {
            return reject(
                ResultCode::DataContractAlreadyPresent,
                format!("data contract {} already exists", contract.id),
            );
        }
        if contract.version != 1 {
            return reject(
                ResultCode::InvalidDataContractVersion,
                format!("new data contract must have version 1, got {}", contract.version),
            );
        }
        let payer = match self.payer(&contract.owner_id, 0)? {
            Ok(payer) => payer,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let mut stored = contract.clone();
        stored.created_at_ms = self.block_info.time_ms();
        stored.save(self.store, self.tx)?;
        self.charge(payer, 0)?;
        Ok(Ok(()))
    }

    fn update_contract(&self, contract: &DataContract) -> Result<std::result::Result<(), Rejection>> {
        let Some(existing) = DataContract::fetch(self.store, &contract.id, self.tx)? else {
            return reject(
                ResultCode::DataContractNotPresent,
                format!("data contract {} not found", contract.id),
            );
        };
        if existing.owner_id != contract.owner_id {
            return reject(
                ResultCode::DataContractOwnerMismatch,
                format!("data contract {} belongs to {}", contract.id, existing.owner_id),
            );
        }
        if contract.version != existing.version + 1 {
            return reject(
                ResultCode::InvalidDataContractVersion,
                format!(
                    "version must be {}, got {}",
                    existing.version + 1,
                    contract.version
                ),
            );
        }
        let payer = match self.payer(&contract.owner_id, 0)? {
            Ok(payer) => payer,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let mut stored = contract.clone();
        stored.created_at_ms = existing.created_at_ms;
        stored.save(self.store, self.tx)?;
        self.charge(payer, 0)?;
        Ok(Ok(()))
    }

    fn apply_documents(
        &self,
        owner_id: &Identifier,
        transitions: &[DocumentTransition],
    ) -> Result<std::result::Result<(), Rejection>> {
        let mut seen = BTreeSet::new();
        let duplicates: Vec<String> = transitions
            .iter()
            .filter(|t| !seen.insert(t.id))
            .map(|t| t.id.to_string())
            .collect();
        if !duplicates.is_empty() {
            return reject(
                ResultCode::DuplicateDocumentTransitions,
                format!("duplicate document transitions: {}", duplicates.join(", ")),
            );
        }

        let mut contracts: BTreeMap<Identifier, DataContract> = BTreeMap::new();
        let mut existing_documents = Vec::with_capacity(transitions.len());
        for transition in transitions {
            if !contracts.contains_key(&transition.data_contract_id) {
                match DataContract::fetch(self.store, &transition.data_contract_id, self.tx)? {
                    Some(contract) => {
                        contracts.insert(contract.id, contract);
                    }
                    None => {
                        return reject(
                            ResultCode::DataContractNotPresent,
                            format!("data contract {} not found", transition.data_contract_id),
                        )
                    }
                }
            }
            let has_type = contracts
                .get(&transition.data_contract_id)
                .is_some_and(|c| c.has_document_type(&transition.document_type));
            if !has_type {
                return reject(
                    ResultCode::InvalidDocumentType,
                    format!(
                        "document type {} is not defined in contract {}",
                        transition.document_type, transition.data_contract_id
                    ),
                );
            }

            let existing = Document::fetch(
                self.store,
                &transition.data_contract_id,
                &transition.document_type,
                &transition.id,
                self.tx,
            )?;
            match (&transition.action, &existing) {
                (DocumentAction::Create { .. }, Some(_)) => {
                    return reject(
                        ResultCode::DocumentAlreadyPresent,
                        format!("document {} already exists", transition.id),
                    )
                }
                (DocumentAction::Replace { .. } | DocumentAction::Delete, None) => {
                    return reject(
                        ResultCode::DocumentNotFound,
                        format!("document {} not found", transition.id),
                    )
                }
                (_, Some(document)) if document.owner_id != *owner_id => {
                    return reject(
                        ResultCode::DocumentOwnerMismatch,
                        format!("document {} belongs to {}", transition.id, document.owner_id),
                    )
                }
                _ => {}
            }
            existing_documents.push(existing);
        }

        let payer = match self.payer(owner_id, 0)? {
            Ok(payer) => payer,
            Err(rejection) => return Ok(Err(rejection)),
        };

        let now = self.block_info.time_ms();
        for (transition, existing) in transitions.iter().zip(existing_documents) {
            let contract_id = &transition.data_contract_id;
            let document_type = transition.document_type.as_str();
            match (&transition.action, existing) {
                (DocumentAction::Create { properties }, _) => Document {
                    id: transition.id,
                    owner_id: *owner_id,
                    revision: 1,
                    properties: properties.clone(),
                    created_at_ms: now,
                    updated_at_ms: now,
                }
                .save(self.store, contract_id, document_type, self.tx)?,
                (DocumentAction::Replace { properties }, Some(mut document)) => {
                    document.properties = properties.clone();
                    document.revision += 1;
                    document.updated_at_ms = now;
                    document.save(self.store, contract_id, document_type, self.tx)?;
                }
                (DocumentAction::Delete, _) => {
                    Document::delete(self.store, contract_id, document_type, &transition.id, self.tx)?;
                }
                (DocumentAction::Replace { .. }, None) => {}
            }
        }
        self.charge(payer, 0)?;
        Ok(Ok(()))
    }

    fn top_up(&self, identity_id: &Identifier, amount: u64) -> Result<std::result::Result<(), Rejection>> {
        let mut identity = match Identity::fetch(self.store, identity_id, self.tx)? {
            Some(identity) if identity.status != IdentityStatus::Removed => identity,
            _ => {
                return reject(
                    ResultCode::IdentityNotFound,
                    format!("identity {identity_id} not found"),
                )
            }
        };
        if amount < self.fee {
            return reject(
                ResultCode::InsufficientBalance,
                format!("top up of {amount} does not cover the fee of {}", self.fee),
            );
        }
        identity.balance = identity.balance.saturating_add(amount - self.fee);
        identity.save(self.store, self.tx)?;
        Ok(Ok(()))
    }

    fn withdraw(&self, transition: &StateTransition) -> Result<std::result::Result<(), Rejection>> {
        let StateTransition::IdentityCreditWithdrawal {
            identity_id,
            amount,
            core_fee_per_byte,
            pooling,
            output_script,
        } = transition
        else {
            return reject(ResultCode::InvalidEncoding, "not a withdrawal");
        };

        let mut payer = match self.payer(identity_id, *amount)? {
            Ok(payer) => payer,
            Err(rejection) => return Ok(Err(rejection)),
        };
        payer.revision += 1;

        let mut key = identity_id.to_vec();
        key.extend_from_slice(&payer.revision.to_be_bytes());
        let record = WithdrawalRecord {
            identity_id: *identity_id,
            amount: *amount,
            core_fee_per_byte: *core_fee_per_byte,
            pooling: *pooling,
            output_script: output_script.clone(),
            queued_at_height: self.block_info.height(),
        };
        storage::save(self.store, &[WITHDRAWALS], &key, &record, self.tx)?;
        self.charge(payer, *amount)?;
        Ok(Ok(()))
    }
}

/// Strict decoding: the bytes must hold exactly one envelope, so a transition
/// has a single valid encoding and a single hash.
fn decode_envelope(raw: &[u8]) -> bincode::Result<StateTransitionEnvelope> {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transitions::Pooling;
    use crate::contracts::{register_system_contracts, DPNS_CONTRACT_ID};
    use crate::core_chain::MasternodeEntry;
    use platform_config::{MAX_STATE_TRANSITION_SIZE, PROTOCOL_VERSION};
    use platform_store::MemoryStore;
    use std::collections::BTreeSet;

    const BLOCK: BlockInfo = BlockInfo::new(5, 0, 1_000);

    fn executor() -> TransitionExecutor {
        TransitionExecutor::new(PROTOCOL_VERSION, MAX_STATE_TRANSITION_SIZE)
    }

    fn funded_store(balance: u64) -> (MemoryStore, Identifier) {
        let store = MemoryStore::in_memory();
        register_system_contracts(&store, None, &BlockInfo::genesis(0)).unwrap();
        let mut identity = Identity::from_masternode(&MasternodeEntry {
            pro_tx_hash: Bytes32([7; 32]),
            operator_public_key: vec![1; 48],
            voting_address: vec![2; 20],
            payout_address: vec![3; 25],
            is_valid: true,
        });
        identity.balance = balance;
        identity.save(&store, None).unwrap();
        (store, identity.id)
    }

    fn run(store: &MemoryStore, transition: StateTransition) -> TransitionResult {
        let raw = StateTransitionEnvelope::new(PROTOCOL_VERSION, transition)
            .to_bytes()
            .unwrap();
        executor().execute(store, None, &BLOCK, &raw).unwrap()
    }

    fn contract(id: u8, owner: Identifier, version: u32) -> DataContract {
        DataContract {
            id: Bytes32([id; 32]),
            owner_id: owner,
            version,
            document_types: BTreeSet::from(["note".to_string()]),
            created_at_ms: 0,
        }
    }

    #[test]
    fn garbage_is_invalid_encoding() {
        let store = MemoryStore::in_memory();
        let result = executor().execute(&store, None, &BLOCK, &[0xff; 3]).unwrap();
        assert_eq!(result.code, ResultCode::InvalidEncoding);
        assert_eq!(result.fee, 0);
    }

    #[test]
    fn trailing_bytes_are_invalid_encoding() {
        let (store, id) = funded_store(10);
        let mut raw = StateTransitionEnvelope::new(
            PROTOCOL_VERSION,
            StateTransition::IdentityTopUp {
                identity_id: id,
                amount: 5_000,
            },
        )
        .to_bytes()
        .unwrap();
        raw.extend_from_slice(&[0, 1, 2]);

        let result = executor().execute(&store, None, &BLOCK, &raw).unwrap();
        assert_eq!(result.code, ResultCode::InvalidEncoding);
        assert_eq!(Identity::fetch(&store, &id, None).unwrap().unwrap().balance, 10);
    }

    #[test]
    fn oversized_transition_is_rejected_before_decoding() {
        let store = MemoryStore::in_memory();
        let raw = vec![0u8; MAX_STATE_TRANSITION_SIZE + 1];
        let result = executor().execute(&store, None, &BLOCK, &raw).unwrap();
        assert_eq!(result.code, ResultCode::TransitionTooLarge);
    }

    #[test]
    fn contract_create_then_update_charges_owner() {
        let (store, owner) = funded_store(1_000_000);
        assert!(run(&store, StateTransition::DataContractCreate { data_contract: contract(1, owner, 1) }).code.is_ok());
        assert_eq!(
            run(&store, StateTransition::DataContractCreate { data_contract: contract(1, owner, 1) }).code,
            ResultCode::DataContractAlreadyPresent
        );
        assert_eq!(
            run(&store, StateTransition::DataContractUpdate { data_contract: contract(1, owner, 3) }).code,
            ResultCode::InvalidDataContractVersion
        );
        let updated = run(&store, StateTransition::DataContractUpdate { data_contract: contract(1, owner, 2) });
        assert!(updated.code.is_ok());

        let stored = DataContract::fetch(&store, &Bytes32([1; 32]), None).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.created_at_ms, BLOCK.time_ms());
        let identity = Identity::fetch(&store, &owner, None).unwrap().unwrap();
        assert!(identity.balance < 1_000_000);
    }

    #[test]
    fn update_by_other_owner_is_rejected() {
        let (store, owner) = funded_store(1_000_000);
        assert!(run(&store, StateTransition::DataContractCreate { data_contract: contract(1, owner, 1) }).code.is_ok());
        let result = run(
            &store,
            StateTransition::DataContractUpdate { data_contract: contract(1, Bytes32([9; 32]), 2) },
        );
        assert_eq!(result.code, ResultCode::DataContractOwnerMismatch);
    }

    #[test]
    fn unfunded_owner_writes_nothing() {
        let (store, owner) = funded_store(10);
        let before = store.root_hash(None).unwrap();
        let result = run(&store, StateTransition::DataContractCreate { data_contract: contract(1, owner, 1) });
        assert_eq!(result.code, ResultCode::InsufficientBalance);
        assert_eq!(store.root_hash(None).unwrap(), before);
    }

    #[test]
    fn duplicate_documents_in_batch_are_rejected() {
        let (store, owner) = funded_store(1_000_000);
        let doc = DocumentTransition {
            id: Bytes32([3; 32]),
            data_contract_id: DPNS_CONTRACT_ID,
            document_type: "domain".to_string(),
            action: DocumentAction::Create { properties: BTreeMap::new() },
        };
        let result = run(
            &store,
            StateTransition::DocumentsBatch { owner_id: owner, transitions: vec![doc.clone(), doc] },
        );
        assert_eq!(result.code, ResultCode::DuplicateDocumentTransitions);
    }

    #[test]
    fn document_lifecycle() {
        let (store, owner) = funded_store(1_000_000);
        let doc = |action| DocumentTransition {
            id: Bytes32([3; 32]),
            data_contract_id: DPNS_CONTRACT_ID,
            document_type: "domain".to_string(),
            action,
        };
        let batch = |action| StateTransition::DocumentsBatch {
            owner_id: owner,
            transitions: vec![doc(action)],
        };
        let props = BTreeMap::from([("label".to_string(), "dash".to_string())]);

        assert_eq!(run(&store, batch(DocumentAction::Delete)).code, ResultCode::DocumentNotFound);
        assert!(run(&store, batch(DocumentAction::Create { properties: props.clone() })).code.is_ok());
        assert_eq!(
            run(&store, batch(DocumentAction::Create { properties: props.clone() })).code,
            ResultCode::DocumentAlreadyPresent
        );
        assert!(run(&store, batch(DocumentAction::Replace { properties: props })).code.is_ok());
        let stored = Document::fetch(&store, &DPNS_CONTRACT_ID, "domain", &Bytes32([3; 32]), None)
            .unwrap()
            .unwrap();
        assert_eq!(stored.revision, 2);
        assert!(run(&store, batch(DocumentAction::Delete)).code.is_ok());

        let mut wrong_type = doc(DocumentAction::Delete);
        wrong_type.document_type = "nope".to_string();
        let result = run(
            &store,
            StateTransition::DocumentsBatch { owner_id: owner, transitions: vec![wrong_type] },
        );
        assert_eq!(result.code, ResultCode::InvalidDocumentType);
    }

    #[test]
    fn withdrawal_is_queued_and_debited() {
        let (store, owner) = funded_store(1_000_000);
        let result = run(
            &store,
            StateTransition::IdentityCreditWithdrawal {
                identity_id: owner,
                amount: 500_000,
                core_fee_per_byte: 1,
                pooling: Pooling::Never,
                output_script: vec![0x76, 0xa9],
            },
        );
        assert!(result.code.is_ok());

        let identity = Identity::fetch(&store, &owner, None).unwrap().unwrap();
        assert_eq!(identity.balance, 1_000_000 - 500_000 - result.fee);
        let mut key = owner.to_vec();
        key.extend_from_slice(&identity.revision.to_be_bytes());
        let record: WithdrawalRecord = storage::fetch(&store, &[WITHDRAWALS], &key, None)
            .unwrap()
            .unwrap();
        assert_eq!(record.amount, 500_000);
        assert_eq!(record.queued_at_height, BLOCK.height());
    }

    #[test]
    fn top_up_must_cover_fee() {
        let (store, owner) = funded_store(0);
        let small = run(&store, StateTransition::IdentityTopUp { identity_id: owner, amount: 1 });
        assert_eq!(small.code, ResultCode::InsufficientBalance);

        let ok = run(&store, StateTransition::IdentityTopUp { identity_id: owner, amount: 1_000_000 });
        assert!(ok.code.is_ok());
        let identity = Identity::fetch(&store, &owner, None).unwrap().unwrap();
        assert_eq!(identity.balance, 1_000_000 - ok.fee);

        let missing = run(
            &store,
            StateTransition::IdentityTopUp { identity_id: Bytes32([0xee; 32]), amount: 1_000_000 },
        );
        assert_eq!(missing.code, ResultCode::IdentityNotFound);
    }
}
