//! Lifecycle requests and responses exchanged with the consensus engine.

use serde::{Deserialize, Serialize};

use crate::core_chain::CoreChainLock;
use crate::epoch::EpochInfo;
use crate::masternodes::MasternodeDiffResult;
use crate::types::{hex_bytes, Bytes32};
use crate::validators::ValidatorSetUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInitChain {
    pub chain_id: String,
    pub initial_height: u64,
    /// Genesis time in milliseconds.
    pub time_ms: u64,
    /// Overrides the configured initial core chain locked height.
    #[serde(default)]
    pub initial_core_height: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInitChain {
    pub app_hash: Bytes32,
    pub validator_set_update: Option<ValidatorSetUpdate>,
    pub initial_core_height: u64,
    pub next_core_chain_lock_update: Option<CoreChainLock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBeginBlock {
    pub height: u64,
    pub time_ms: u64,
    pub core_chain_locked_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBeginBlock {
    pub masternode_diff: MasternodeDiffResult,
    pub epoch_info: EpochInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDeliverTx {
    #[serde(with = "hex_bytes")]
    pub tx: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub info: String,
    pub fee: u64,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEndBlock {
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEndBlock {
    pub validator_set_update: Option<ValidatorSetUpdate>,
    pub next_core_chain_lock_update: Option<CoreChainLock>,
    pub fees: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCommit {
    pub height: u64,
    pub app_hash: Bytes32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub version: String,
    pub protocol_version: u32,
    pub last_block_height: u64,
    pub last_block_app_hash: Bytes32,
}

/// One line of the node's request stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    Info,
    InitChain(RequestInitChain),
    BeginBlock(RequestBeginBlock),
    DeliverTx(RequestDeliverTx),
    EndBlock(RequestEndBlock),
    Commit,
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Request::Info => "info",
            Request::InitChain(_) => "init_chain",
            Request::BeginBlock(_) => "begin_block",
            Request::DeliverTx(_) => "deliver_tx",
            Request::EndBlock(_) => "end_block",
            Request::Commit => "commit",
        }
    }
}

/// One line of the node's response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Response {
    Info(ResponseInfo),
    InitChain(ResponseInitChain),
    BeginBlock(ResponseBeginBlock),
    DeliverTx(ResponseDeliverTx),
    EndBlock(ResponseEndBlock),
    Commit(ResponseCommit),
    Exception { error: String },
}
