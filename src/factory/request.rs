use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::fmt;
use primitive_types::{H160, H256, U256};
use tracing::warn;
use super::{FactoryError, FactoryResult, Timestamp};

/// Which ledger a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Mint,
    Burn,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Mint => f.write_str("mint"),
            RequestKind::Burn => f.write_str("burn"),
        }
    }
}

/// Request lifecycle state. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Canceled,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Canceled => "canceled",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A mint or burn request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub nonce: u64,
    pub requester: H160,
    pub amount: U256,
    pub deposit: String,
    /// Off-chain transaction identifier, set by the confirming custodian
    pub external_ref: String,
    pub timestamp: Timestamp,
    pub status: RequestStatus,
    pub request_hash: H256,
}

impl Request {
    /// Recompute the commitment from the creation-time fields
    pub fn compute_hash(&self) -> H256 {
        request_hash(
            self.nonce,
            self.requester,
            self.amount,
            &self.deposit,
            self.timestamp,
        )
    }
}

fn word_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Commitment over a request's immutable fields.
///
/// keccak256 of the ABI-style encoding: nonce, requester, amount and
/// timestamp as 32-byte big-endian words, then the deposit as a length word
/// followed by its bytes zero-padded to a word boundary.
pub fn request_hash(
    nonce: u64,
    requester: H160,
    amount: U256,
    deposit: &str,
    timestamp: Timestamp,
) -> H256 {
    let mut hasher = Keccak256::new();

    hasher.update(word_u64(nonce));

    let mut requester_word = [0u8; 32];
    requester_word[12..].copy_from_slice(requester.as_bytes());
    hasher.update(requester_word);

    let mut amount_word = [0u8; 32];
    amount.to_big_endian(&mut amount_word);
    hasher.update(amount_word);

    hasher.update(word_u64(timestamp));

    let deposit = deposit.as_bytes();
    hasher.update(word_u64(deposit.len() as u64));
    hasher.update(deposit);
    let padding = (32 - deposit.len() % 32) % 32;
    hasher.update(&[0u8; 32][..padding]);

    H256::from_slice(&hasher.finalize())
}

/// Append-only request arena keyed by nonce, with a hash index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLedger {
    kind: RequestKind,
    requests: Vec<Request>,
    by_hash: HashMap<H256, u64>,
}

impl RequestLedger {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            requests: Vec::new(),
            by_hash: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Nonce the next request will receive
    pub fn next_nonce(&self) -> u64 {
        self.requests.len() as u64
    }

    /// Append a new pending request and return it
    pub fn open(
        &mut self,
        requester: H160,
        amount: U256,
        deposit: String,
        timestamp: Timestamp,
    ) -> &Request {
        let nonce = self.next_nonce();
        let request_hash = request_hash(nonce, requester, amount, &deposit, timestamp);

        self.by_hash.insert(request_hash, nonce);
        self.requests.push(Request {
            nonce,
            requester,
            amount,
            deposit,
            external_ref: String::new(),
            timestamp,
            status: RequestStatus::Pending,
            request_hash,
        });

        &self.requests[nonce as usize]
    }

    pub fn get(&self, nonce: u64) -> FactoryResult<&Request> {
        usize::try_from(nonce)
            .ok()
            .and_then(|index| self.requests.get(index))
            .ok_or(FactoryError::NotFound {
                kind: self.kind,
                nonce,
            })
    }

    pub fn find_by_hash(&self, hash: H256) -> FactoryResult<&Request> {
        let nonce = self
            .by_hash
            .get(&hash)
            .copied()
            .ok_or(FactoryError::UnknownRequestHash {
                kind: self.kind,
                hash,
            })?;
        self.get(nonce)
    }

    /// Resolve `hash` to a pending request whose recomputed commitment matches.
    pub fn pending_by_hash(&self, hash: H256) -> FactoryResult<&Request> {
        let request = self.find_by_hash(hash)?;

        if request.status != RequestStatus::Pending {
            return Err(FactoryError::InvalidStateTransition {
                kind: self.kind,
                nonce: request.nonce,
                status: request.status,
            });
        }

        let computed = request.compute_hash();
        if computed != hash {
            warn!(
                "{} request {} commitment drifted: supplied {:?}, computed {:?}",
                self.kind,
                request.nonce,
                hash,
                computed
            );
            return Err(FactoryError::HashMismatch {
                supplied: hash,
                computed,
            });
        }

        Ok(request)
    }

    /// Move a pending request to a terminal status.
    ///
    /// Callers validate with `pending_by_hash` first; this only refuses to
    /// leave a terminal state.
    pub fn finalize(
        &mut self,
        nonce: u64,
        status: RequestStatus,
        external_ref: Option<String>,
    ) -> FactoryResult<&Request> {
        let kind = self.kind;
        let request = usize::try_from(nonce)
            .ok()
            .and_then(|index| self.requests.get_mut(index))
            .ok_or(FactoryError::NotFound { kind, nonce })?;

        if request.status.is_terminal() {
            return Err(FactoryError::InvalidStateTransition {
                kind,
                nonce,
                status: request.status,
            });
        }

        request.status = status;
        if let Some(external_ref) = external_ref {
            request.external_ref = external_ref;
        }
        Ok(&*request)
    }

    #[cfg(test)]
    pub(crate) fn request_mut(&mut self, nonce: u64) -> &mut Request {
        &mut self.requests[nonce as usize]
    }

    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.requests
            .iter()
            .filter(|request| request.status == RequestStatus::Pending)
    }

    /// Pending requests opened at least `max_age` seconds before `now`
    pub fn stale(&self, now: Timestamp, max_age: u64) -> impl Iterator<Item = &Request> {
        self.pending()
            .filter(move |request| now.saturating_sub(request.timestamp) >= max_age)
    }
}
