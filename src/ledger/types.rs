//! Values exchanged with the ledger

use crate::schedule::{KeySet, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier the ledger assigns to a schedule (`shard.realm.num`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger account identifier (`shard.realm.num`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// The transaction body a schedule executes. Opaque to the schedule core;
/// only the ledger interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(#[serde(with = "hex_bytes")] Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One leg of a transfer; negative amounts debit the account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub account: AccountId,
    pub amount: i64,
}

/// A balanced set of account transfers, the payload `LocalLedger` understands
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub transfers: Vec<Transfer>,
}

impl TransferPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transfer leg
    pub fn add_transfer(mut self, account: &AccountId, amount: i64) -> Self {
        self.transfers.push(Transfer {
            account: account.clone(),
            amount,
        });
        self
    }

    /// Sum of all legs, `None` on overflow. A valid transfer nets to zero.
    pub fn net(&self) -> Option<i64> {
        self.transfers
            .iter()
            .try_fold(0i64, |sum, t| sum.checked_add(t.amount))
    }

    /// Net change per account, `None` on overflow
    pub fn net_by_account(&self) -> Option<BTreeMap<AccountId, i64>> {
        let mut deltas = BTreeMap::new();
        for leg in &self.transfers {
            let delta = deltas.entry(leg.account.clone()).or_insert(0i64);
            *delta = delta.checked_add(leg.amount)?;
        }
        Some(deltas)
    }

    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        Ok(Payload::new(serde_json::to_vec(self)?))
    }

    pub fn from_payload(payload: &Payload) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload.as_bytes())
    }
}

/// Everything the ledger needs to persist a new schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub payload: Payload,
    pub key_set: KeySet,
    pub creator: AccountId,
    pub payer: AccountId,
    pub admin: Option<MemberId>,
    pub memo: String,
    pub expiration_time: DateTime<Utc>,
}

/// Ledger receipt for an executed schedule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub schedule_id: ScheduleId,
    /// Id of the transaction the ledger applied
    pub transaction_id: String,
    pub consensus_at: DateTime<Utc>,
}

/// Schedule state as the ledger sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteState {
    Pending,
    Executed { at: DateTime<Utc> },
    Deleted { at: DateTime<Utc> },
    Expired,
}

/// Result of querying a schedule on the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub schedule_id: ScheduleId,
    pub state: RemoteState,
    pub memo: String,
    pub expiration_time: DateTime<Utc>,
}
