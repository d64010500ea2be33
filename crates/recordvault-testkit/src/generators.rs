//! Proptest generators for property-based testing.

use proptest::prelude::*;

use recordvault::LocalWallet;
use recordvault_core::{
    Action, DataKeyId, GrantId, Keypair, RecordId, RequestId, Transaction, TransactionBuilder,
    TxId,
};
use recordvault_ledger::RecordMetadata;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a wallet from random seeds.
pub fn wallet() -> impl Strategy<Value = LocalWallet> {
    (any::<[u8; 32]>(), any::<[u8; 32]>())
        .prop_map(|(signing, encryption)| LocalWallet::from_seeds(signing, encryption))
}

pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 32]>().prop_map(RecordId::from_bytes)
}

pub fn tx_id() -> impl Strategy<Value = TxId> {
    any::<[u8; 32]>().prop_map(TxId::from_bytes)
}

pub fn request_id() -> impl Strategy<Value = RequestId> {
    any::<[u8; 32]>().prop_map(RequestId::from_bytes)
}

pub fn grant_id() -> impl Strategy<Value = GrantId> {
    any::<[u8; 32]>().prop_map(GrantId::from_bytes)
}

pub fn data_key_id() -> impl Strategy<Value = DataKeyId> {
    any::<[u8; 32]>().prop_map(DataKeyId::from_bytes)
}

/// Generate document bytes of at most `max_len` bytes.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// A reason with at least one non-whitespace character.
pub fn reason() -> impl Strategy<Value = String> {
    "[ ]{0,2}[a-zA-Z0-9][a-zA-Z0-9 ,.-]{0,40}".prop_map(String::from)
}

/// A reason that is empty or whitespace only.
pub fn blank_reason() -> impl Strategy<Value = String> {
    "[ \t\n]{0,8}".prop_map(String::from)
}

pub fn metadata() -> impl Strategy<Value = RecordMetadata> {
    (
        "[a-z][a-z0-9-]{0,23}\\.(pdf|png|txt)",
        prop_oneof![
            Just("application/pdf".to_string()),
            Just("image/png".to_string()),
            Just("text/plain".to_string()),
        ],
    )
        .prop_map(|(file_name, content_type)| RecordMetadata {
            file_name,
            content_type,
        })
}

/// One step of an access-control scenario.
///
/// Indices select among the requests and grants made so far, modulo their
/// count, so every generated sequence is applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOp {
    /// Provider `0..providers` requests access.
    Request { provider: usize },
    Approve { request: usize },
    Deny { request: usize },
    Revoke { grant: usize },
    /// A provider tries to approve a request instead of the owner.
    ForgedApprove { request: usize, provider: usize },
}

/// Generate a scenario of up to `max_len` steps over `providers` providers.
pub fn access_ops(providers: usize, max_len: usize) -> impl Strategy<Value = Vec<AccessOp>> {
    let providers = providers.max(1);
    let op = prop_oneof![
        3 => (0..providers).prop_map(|provider| AccessOp::Request { provider }),
        3 => any::<usize>().prop_map(|request| AccessOp::Approve { request }),
        1 => any::<usize>().prop_map(|request| AccessOp::Deny { request }),
        2 => any::<usize>().prop_map(|grant| AccessOp::Revoke { grant }),
        1 => (any::<usize>(), 0..providers)
            .prop_map(|(request, provider)| AccessOp::ForgedApprove { request, provider }),
    ];
    prop::collection::vec(op, 1..=max_len)
}

/// Parameters for a standalone signed transaction.
#[derive(Debug, Clone)]
pub struct TransactionParams {
    pub keypair: Keypair,
    pub record_id: RecordId,
    pub seq: u64,
    pub action: Action,
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub prev_tx_id: Option<TxId>,
}

impl Arbitrary for TransactionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let action = prop_oneof![
            Just(Action::RequestAccess),
            Just(Action::Approve),
            Just(Action::Deny),
            Just(Action::Revoke),
            Just(Action::Rekey),
        ];
        (
            keypair(),
            record_id(),
            2u64..=1000u64,
            action,
            0i64..=1_700_000_000_000i64,
            plaintext(512),
            tx_id(),
        )
            .prop_map(|(keypair, record_id, seq, action, timestamp, payload, prev)| {
                TransactionParams {
                    keypair,
                    record_id,
                    seq,
                    action,
                    timestamp,
                    payload,
                    prev_tx_id: Some(prev),
                }
            })
            .boxed()
    }
}

/// Build and sign a transaction from parameters.
pub fn transaction_from_params(params: &TransactionParams) -> Transaction {
    let mut builder = TransactionBuilder::new(params.record_id, params.seq)
        .action(params.action)
        .timestamp(params.timestamp)
        .payload(params.payload.clone());
    if let Some(prev) = params.prev_tx_id {
        builder = builder.prev(prev);
    }
    builder.sign(&params.keypair)
}
