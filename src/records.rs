//! Records returned by fetchers. Each source shape is a variant of
//! [`Record`]; [`ToCanonical`] projects any of them onto the common
//! [`CanonicalRecord`] view used by sinks that store heterogeneous history.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    NormalTx(NormalTx),
    InternalTx(InternalTx),
    TokenTransfer(TokenTransfer),
    EventLog(EventLog),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    NormalTx,
    InternalTx,
    TokenTransfer,
    EventLog,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::NormalTx => "normal_tx",
            RecordKind::InternalTx => "internal_tx",
            RecordKind::TokenTransfer => "token_transfer",
            RecordKind::EventLog => "event_log",
        }
    }
}

/// Top-level transaction sent by an externally owned account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalTx {
    pub block_number: u64,
    pub timestamp: u64,
    pub hash: String,
    pub transaction_index: u64,
    pub from: String,
    pub to: String,
    /// Wei, decimal string.
    pub value: String,
    pub gas: u64,
    pub gas_price: String,
    pub gas_used: u64,
    pub is_error: bool,
    pub contract_address: Option<String>,
}

/// Value transfer produced by a contract call inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTx {
    pub block_number: u64,
    pub timestamp: u64,
    pub hash: String,
    pub trace_id: Option<String>,
    pub call_type: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub contract_address: Option<String>,
    pub is_error: bool,
}

/// ERC-20 style `Transfer` as reported by an explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub block_number: u64,
    pub timestamp: u64,
    pub hash: String,
    pub transaction_index: u64,
    pub from: String,
    pub to: String,
    pub value: String,
    pub contract_address: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: u8,
}

/// Raw contract event as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub log_index: u64,
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub removed: bool,
}

/// Source-independent projection of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub kind: RecordKind,
    pub block_number: u64,
    pub timestamp: Option<u64>,
    pub tx_hash: String,
    /// Transaction index or log index, whichever the source reports.
    pub position: Option<u64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub contract: Option<String>,
}

pub trait ToCanonical {
    fn to_canonical(&self) -> CanonicalRecord;
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::NormalTx(_) => RecordKind::NormalTx,
            Record::InternalTx(_) => RecordKind::InternalTx,
            Record::TokenTransfer(_) => RecordKind::TokenTransfer,
            Record::EventLog(_) => RecordKind::EventLog,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Record::NormalTx(tx) => tx.block_number,
            Record::InternalTx(tx) => tx.block_number,
            Record::TokenTransfer(transfer) => transfer.block_number,
            Record::EventLog(log) => log.block_number,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            Record::NormalTx(tx) => &tx.hash,
            Record::InternalTx(tx) => &tx.hash,
            Record::TokenTransfer(transfer) => &transfer.hash,
            Record::EventLog(log) => &log.transaction_hash,
        }
    }
}

impl ToCanonical for Record {
    fn to_canonical(&self) -> CanonicalRecord {
        match self {
            Record::NormalTx(tx) => tx.to_canonical(),
            Record::InternalTx(tx) => tx.to_canonical(),
            Record::TokenTransfer(transfer) => transfer.to_canonical(),
            Record::EventLog(log) => log.to_canonical(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl ToCanonical for NormalTx {
    fn to_canonical(&self) -> CanonicalRecord {
        CanonicalRecord {
            kind: RecordKind::NormalTx,
            block_number: self.block_number,
            timestamp: Some(self.timestamp),
            tx_hash: self.hash.clone(),
            position: Some(self.transaction_index),
            from: non_empty(&self.from),
            to: non_empty(&self.to),
            value: Some(self.value.clone()),
            contract: self.contract_address.clone(),
        }
    }
}

impl ToCanonical for InternalTx {
    fn to_canonical(&self) -> CanonicalRecord {
        CanonicalRecord {
            kind: RecordKind::InternalTx,
            block_number: self.block_number,
            timestamp: Some(self.timestamp),
            tx_hash: self.hash.clone(),
            position: None,
            from: non_empty(&self.from),
            to: non_empty(&self.to),
            value: Some(self.value.clone()),
            contract: self.contract_address.clone(),
        }
    }
}

impl ToCanonical for TokenTransfer {
    fn to_canonical(&self) -> CanonicalRecord {
        CanonicalRecord {
            kind: RecordKind::TokenTransfer,
            block_number: self.block_number,
            timestamp: Some(self.timestamp),
            tx_hash: self.hash.clone(),
            position: Some(self.transaction_index),
            from: non_empty(&self.from),
            to: non_empty(&self.to),
            value: Some(self.value.clone()),
            contract: Some(self.contract_address.clone()),
        }
    }
}

impl ToCanonical for EventLog {
    fn to_canonical(&self) -> CanonicalRecord {
        CanonicalRecord {
            kind: RecordKind::EventLog,
            block_number: self.block_number,
            timestamp: None,
            tx_hash: self.transaction_hash.clone(),
            position: Some(self.log_index),
            from: None,
            to: None,
            value: None,
            contract: Some(self.address.clone()),
        }
    }
}

#[cfg(test)]
impl EventLog {
    pub(crate) fn at_block(block_number: u64) -> Self {
        Self {
            block_number,
            block_hash: format!("0x{block_number:064x}"),
            transaction_hash: format!("0x{:064x}", block_number + 1),
            transaction_index: 0,
            log_index: 0,
            address: "0x0000000000000000000000000000000000000001".to_string(),
            topics: Vec::new(),
            data: "0x".to_string(),
            removed: false,
        }
    }
}
