use crate::fetch::FetchError;
use crate::records::{InternalTx, NormalTx, Record, TokenTransfer};
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Transaction listings an explorer exposes per address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Normal,
    Internal,
    TokenTransfer,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 3] = [
        TransactionKind::Normal,
        TransactionKind::Internal,
        TransactionKind::TokenTransfer,
    ];

    /// Value of the `action` query parameter.
    pub fn action(&self) -> &'static str {
        match self {
            TransactionKind::Normal => "txlist",
            TransactionKind::Internal => "txlistinternal",
            TransactionKind::TokenTransfer => "tokentx",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Normal => "normal",
            TransactionKind::Internal => "internal",
            TransactionKind::TokenTransfer => "transfer",
        }
    }

    pub(crate) fn decode(&self, items: Vec<Value>) -> Result<Vec<Record>> {
        items
            .into_iter()
            .map(|item| match self {
                TransactionKind::Normal => {
                    NormalTx::try_from(decode_item::<ExplorerNormalTx>(item)?).map(Record::NormalTx)
                }
                TransactionKind::Internal => {
                    InternalTx::try_from(decode_item::<ExplorerInternalTx>(item)?)
                        .map(Record::InternalTx)
                }
                TransactionKind::TokenTransfer => {
                    TokenTransfer::try_from(decode_item::<ExplorerTokenTransfer>(item)?)
                        .map(Record::TokenTransfer)
                }
            })
            .collect()
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" | "txlist" => Ok(TransactionKind::Normal),
            "internal" | "txlistinternal" => Ok(TransactionKind::Internal),
            "transfer" | "token" | "tokentx" => Ok(TransactionKind::TokenTransfer),
            other => anyhow::bail!("unknown transaction kind: {other}"),
        }
    }
}

/// Response envelope shared by every explorer endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ExplorerEnvelope {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

const NO_TRANSACTIONS_FOUND: &str = "No transactions found";

impl ExplorerEnvelope {
    /// Decodes a response body. A body that is not an envelope is malformed
    /// and asking again will not change it.
    pub(crate) fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|err| {
            FetchError::malformed(format!("undecodable explorer response: {err}")).into()
        })
    }

    /// Unwraps the result list. A `status == "0"` page that says nothing was
    /// found maps to [`FetchError::NoData`]; any other failure status is an
    /// error the caller may retry.
    pub(crate) fn into_items(self) -> Result<Vec<Value>> {
        let is_empty = matches!(&self.result, Value::Array(items) if items.is_empty());

        if self.status == "0" {
            if self.message == NO_TRANSACTIONS_FOUND || is_empty {
                return Err(FetchError::NoData.into());
            }
            anyhow::bail!("explorer error: message={}, result={}", self.message, self.result);
        }

        match self.result {
            Value::Array(items) => Ok(items),
            other => Err(FetchError::malformed(format!(
                "explorer result is not a list: {other}"
            ))
            .into()),
        }
    }
}

fn decode_item<T: for<'de> Deserialize<'de>>(item: Value) -> Result<T> {
    serde_json::from_value(item)
        .map_err(|err| FetchError::malformed(format!("invalid explorer payload: {err}")).into())
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        FetchError::malformed(format!("invalid {field} in explorer payload: {value:?}")).into()
    })
}

fn parse_flag(value: &str) -> bool {
    value == "1"
}

fn optional(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerNormalTx {
    block_number: String,
    time_stamp: String,
    hash: String,
    transaction_index: String,
    from: String,
    to: String,
    value: String,
    gas: String,
    gas_price: String,
    gas_used: String,
    #[serde(default)]
    is_error: String,
    #[serde(default)]
    contract_address: String,
}

impl TryFrom<ExplorerNormalTx> for NormalTx {
    type Error = anyhow::Error;

    fn try_from(tx: ExplorerNormalTx) -> Result<Self> {
        Ok(NormalTx {
            block_number: parse_number("blockNumber", &tx.block_number)?,
            timestamp: parse_number("timeStamp", &tx.time_stamp)?,
            transaction_index: parse_number("transactionIndex", &tx.transaction_index)?,
            gas: parse_number("gas", &tx.gas)?,
            gas_used: parse_number("gasUsed", &tx.gas_used)?,
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas_price: tx.gas_price,
            is_error: parse_flag(&tx.is_error),
            contract_address: optional(tx.contract_address),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerInternalTx {
    block_number: String,
    time_stamp: String,
    hash: String,
    from: String,
    to: String,
    value: String,
    #[serde(default)]
    contract_address: String,
    #[serde(rename = "type", default)]
    call_type: String,
    #[serde(default)]
    trace_id: String,
    #[serde(default)]
    is_error: String,
}

impl TryFrom<ExplorerInternalTx> for InternalTx {
    type Error = anyhow::Error;

    fn try_from(tx: ExplorerInternalTx) -> Result<Self> {
        Ok(InternalTx {
            block_number: parse_number("blockNumber", &tx.block_number)?,
            timestamp: parse_number("timeStamp", &tx.time_stamp)?,
            hash: tx.hash,
            trace_id: optional(tx.trace_id),
            call_type: tx.call_type,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            contract_address: optional(tx.contract_address),
            is_error: parse_flag(&tx.is_error),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTokenTransfer {
    block_number: String,
    time_stamp: String,
    hash: String,
    transaction_index: String,
    from: String,
    to: String,
    value: String,
    contract_address: String,
    #[serde(default)]
    token_name: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
}

impl TryFrom<ExplorerTokenTransfer> for TokenTransfer {
    type Error = anyhow::Error;

    fn try_from(transfer: ExplorerTokenTransfer) -> Result<Self> {
        // Some tokens never report decimals.
        let token_decimal = if transfer.token_decimal.is_empty() {
            0
        } else {
            parse_number("tokenDecimal", &transfer.token_decimal)?
        };

        Ok(TokenTransfer {
            block_number: parse_number("blockNumber", &transfer.block_number)?,
            timestamp: parse_number("timeStamp", &transfer.time_stamp)?,
            transaction_index: parse_number("transactionIndex", &transfer.transaction_index)?,
            hash: transfer.hash,
            from: transfer.from,
            to: transfer.to,
            value: transfer.value,
            contract_address: transfer.contract_address.to_ascii_lowercase(),
            token_name: transfer.token_name,
            token_symbol: transfer.token_symbol,
            token_decimal,
        })
    }
}
