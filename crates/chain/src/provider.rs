//! Chain RPC provider.
//!
//! All chain access funnels through the [`ChainRpc`] trait so the assembler,
//! registry, and submitter can be exercised against mocks. The real
//! implementation wraps the nonblocking Solana RPC client with a per-call
//! timeout.

use std::time::Duration;

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::{RpcError as JsonRpcError, RpcResponseErrorData};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use solana_transaction_status::TransactionStatus;
use thiserror::Error;

/// RPC failures that are not transaction rejections.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc request failed: {0}")]
    Request(String),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),
}

/// A transaction the RPC node refused to forward. Preflight simulation
/// details are carried when the node ran one.
#[derive(Debug, Clone, Default)]
pub struct SendRejection {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
    pub message: String,
}

/// The chain operations this crate needs.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn account_data(&self, key: &Pubkey) -> Result<Vec<u8>, RpcError>;

    async fn latest_blockhash(&self) -> Result<Hash, RpcError>;

    /// Send with preflight simulation enabled.
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SendRejection>;

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionStatus>, RpcError>;

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, RpcError>;
}

/// Nonblocking RPC client with a per-call timeout.
pub struct RpcProvider {
    client: RpcClient,
}

impl RpcProvider {
    pub fn new(url: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment),
        }
    }
}

#[async_trait]
impl ChainRpc for RpcProvider {
    async fn account_data(&self, key: &Pubkey) -> Result<Vec<u8>, RpcError> {
        self.client
            .get_account_data(key)
            .await
            .map_err(|err| classify_account_error(key, err))
    }

    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|err| RpcError::Request(err.to_string()))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SendRejection> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(into_rejection)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionStatus>, RpcError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|err| RpcError::Request(err.to_string()))?;
        Ok(response.value.into_iter().next().flatten())
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, RpcError> {
        self.client
            .is_blockhash_valid(blockhash, CommitmentConfig::processed())
            .await
            .map_err(|err| RpcError::Request(err.to_string()))
    }
}

fn classify_account_error(key: &Pubkey, err: ClientError) -> RpcError {
    match err.kind() {
        ClientErrorKind::RpcError(JsonRpcError::ForUser(message))
            if message.contains("AccountNotFound") =>
        {
            RpcError::AccountNotFound(*key)
        }
        _ => RpcError::Request(err.to_string()),
    }
}

fn into_rejection(err: ClientError) -> SendRejection {
    let message = err.to_string();
    if let ClientErrorKind::RpcError(JsonRpcError::RpcResponseError {
        data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
        ..
    }) = err.kind()
    {
        return SendRejection {
            err: simulation.err.clone(),
            logs: simulation.logs.clone().unwrap_or_default(),
            message,
        };
    }
    SendRejection {
        err: None,
        logs: Vec::new(),
        message,
    }
}
