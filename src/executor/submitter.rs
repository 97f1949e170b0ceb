use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine as _};
use solana_hash::Hash;
use solana_instruction::Instruction;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::Transaction;

use super::backoff::ExponentialBackoff;
use super::{ExecutionError, TransactionSubmitter};
use crate::rpc::{lock_pool, Endpoint, ProviderError, RpcLedgerClient, SharedEndpointPool};

const FIRST_STATUS_POLL: Duration = Duration::from_millis(500);
const MAX_STATUS_POLL: Duration = Duration::from_secs(4);

/// Parse a base58 64-byte keypair (the format wallets export).
pub fn keypair_from_base58(encoded: &str) -> Result<Keypair, ExecutionError> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| ExecutionError::Signing(format!("private key is not base58: {}", e)))?;
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| ExecutionError::Signing(format!("invalid keypair bytes: {}", e)))
}

/// Signs with the holder keypair and lands transactions over JSON-RPC,
/// always through the pool's active endpoint.
pub struct RpcSubmitter {
    keypair: Keypair,
    pool: SharedEndpointPool,
    cached: Mutex<Option<(Endpoint, Arc<RpcLedgerClient>)>>,
    confirm_timeout: Duration,
    dry_run: bool,
}

impl RpcSubmitter {
    pub fn new(keypair: Keypair, pool: SharedEndpointPool, confirm_timeout: Duration, dry_run: bool) -> Self {
        log::info!(
            "🔑 Submitter ready for {} via {}{}",
            keypair.pubkey(),
            lock_pool(&pool).current().rpc_url,
            if dry_run { " (dry run)" } else { "" }
        );
        Self {
            keypair,
            pool,
            cached: Mutex::new(None),
            confirm_timeout,
            dry_run,
        }
    }

    /// Client for the pool's active endpoint, rebuilt after a rotation.
    fn client(&self) -> (Endpoint, Arc<RpcLedgerClient>) {
        let endpoint = lock_pool(&self.pool).current().clone();
        let mut cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match cached.as_ref() {
            Some((bound, client)) if *bound == endpoint => (endpoint, client.clone()),
            _ => {
                let client = Arc::new(RpcLedgerClient::new(&endpoint));
                *cached = Some((endpoint.clone(), client.clone()));
                (endpoint, client)
            }
        }
    }

    fn observe<T>(&self, used: &Endpoint, result: Result<T, ProviderError>) -> Result<T, ProviderError> {
        lock_pool(&self.pool).record_outcome(used, result.as_ref().err());
        result
    }

    fn sign(&self, instructions: &[Instruction], blockhash: &str) -> Result<(Transaction, String), ExecutionError> {
        let blockhash = Hash::from_str(blockhash)
            .map_err(|e| ExecutionError::Build(format!("bad blockhash {}: {}", blockhash, e)))?;

        let transaction = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.keypair.pubkey()),
            &[&self.keypair],
            blockhash,
        );

        let signature = transaction
            .signatures
            .first()
            .filter(|s| **s != Signature::default())
            .map(Signature::to_string)
            .ok_or_else(|| ExecutionError::Signing("transaction carries no signature".to_string()))?;

        Ok((transaction, signature))
    }
}

#[async_trait]
impl TransactionSubmitter for RpcSubmitter {
    fn payer(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn submit(&self, instructions: Vec<Instruction>) -> Result<String, ExecutionError> {
        let (endpoint, client) = self.client();
        let blockhash = self.observe(&endpoint, client.latest_blockhash().await)?;
        let (transaction, signature) = self.sign(&instructions, &blockhash.blockhash)?;

        let wire = bincode::serialize(&transaction)
            .map_err(|e| ExecutionError::Build(format!("serialize: {}", e)))?;
        let encoded = BASE64_ENGINE.encode(wire);

        if self.dry_run {
            let simulation = self.observe(&endpoint, client.simulate_transaction(&encoded).await)?;
            if let Some(logs) = &simulation.logs {
                for line in logs {
                    log::debug!("   sim: {}", line);
                }
            }
            if let Some(err) = simulation.err {
                return Err(ExecutionError::TransactionFailed {
                    signature,
                    reason: err.to_string(),
                });
            }
            log::info!("🧪 Simulation passed for {}", signature);
            return Ok(signature);
        }

        match self.observe(&endpoint, client.send_transaction(&encoded).await) {
            Ok(sent) => Ok(sent),
            Err(ProviderError::Rpc { message, .. }) => Err(ExecutionError::Submission(message)),
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm(&self, signature: &str) -> Result<(), ExecutionError> {
        if self.dry_run {
            return Ok(());
        }

        let mut backoff = ExponentialBackoff::new(FIRST_STATUS_POLL, MAX_STATUS_POLL, self.confirm_timeout);
        loop {
            let (endpoint, client) = self.client();
            match self.observe(&endpoint, client.signature_status(signature).await) {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return Err(ExecutionError::TransactionFailed {
                            signature: signature.to_string(),
                            reason: err.to_string(),
                        });
                    }
                    if status.is_confirmed() {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e @ (ProviderError::RateLimited | ProviderError::Network(_))) => {
                    log::debug!("Status poll for {} failed: {}", signature, e);
                }
                Err(e) => return Err(e.into()),
            }

            backoff
                .sleep()
                .await
                .map_err(|_| ExecutionError::ConfirmationTimeout(signature.to_string()))?;
        }
    }
}
