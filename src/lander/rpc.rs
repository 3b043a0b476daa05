use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, info};

use super::deadline::Deadline;
use super::error::LanderError;
use super::LedgerClient;

const MAX_SIMULATION_LOGS: usize = 8;

enum StatusCheck {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Clone)]
pub struct RpcLander {
    client: Arc<RpcClient>,
    config: RpcSendTransactionConfig,
    commitment: CommitmentConfig,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl RpcLander {
    pub fn new(client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        let config = RpcSendTransactionConfig {
            preflight_commitment: Some(commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        Self {
            client,
            config,
            commitment,
            poll_interval: Duration::from_secs(1),
            confirm_timeout: Duration::from_secs(90),
        }
    }

    pub fn with_confirmation(mut self, poll_interval: Duration, confirm_timeout: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(50));
        self.confirm_timeout = confirm_timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        self.client.url()
    }

    async fn status(&self, signature: &Signature) -> Result<StatusCheck, LanderError> {
        let response = self.client.get_signature_statuses(&[*signature]).await?;
        let Some(Some(status)) = response.value.into_iter().next() else {
            return Ok(StatusCheck::Pending);
        };
        if let Some(err) = status.err.as_ref() {
            return Ok(StatusCheck::Failed(format!("{err:?}")));
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(StatusCheck::Confirmed)
        } else {
            Ok(StatusCheck::Pending)
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLander {
    async fn block_height(&self) -> Result<u64, LanderError> {
        Ok(self
            .client
            .get_block_height_with_commitment(self.commitment)
            .await?)
    }

    async fn simulate(&self, transaction: &VersionedTransaction) -> Result<(), LanderError> {
        let response = self.client.simulate_transaction(transaction).await?;
        match response.value.err {
            None => {
                debug!(
                    target: "lander::rpc",
                    units = ?response.value.units_consumed,
                    "模拟执行通过"
                );
                Ok(())
            }
            Some(err) => {
                let logs = response.value.logs.unwrap_or_default();
                let skip = logs.len().saturating_sub(MAX_SIMULATION_LOGS);
                Err(LanderError::Simulation {
                    message: format!("{err:?}"),
                    logs: logs.into_iter().skip(skip).collect(),
                })
            }
        }
    }

    async fn submit(&self, transaction: &VersionedTransaction) -> Result<Signature, LanderError> {
        let signature = self
            .client
            .send_transaction_with_config(transaction, self.config.clone())
            .await?;
        info!(
            target: "lander::rpc",
            signature = %signature,
            endpoint = %self.client.url(),
            skip_preflight = self.config.skip_preflight,
            max_retries = ?self.config.max_retries,
            "transaction submitted via rpc client"
        );
        Ok(signature)
    }

    async fn confirm(&self, signature: &Signature, expiry_height: u64) -> Result<(), LanderError> {
        let started = Instant::now();
        let deadline = Deadline::after(self.confirm_timeout);
        loop {
            match self.status(signature).await? {
                StatusCheck::Confirmed => {
                    info!(
                        target: "lander::rpc",
                        signature = %signature,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "交易已确认"
                    );
                    return Ok(());
                }
                StatusCheck::Failed(reason) => return Err(LanderError::OnChain(reason)),
                StatusCheck::Pending => {}
            }

            let height = self.block_height().await?;
            if height > expiry_height {
                // 过期前最后一刻落地的交易仍以状态为准。
                return match self.status(signature).await? {
                    StatusCheck::Confirmed => Ok(()),
                    StatusCheck::Failed(reason) => Err(LanderError::OnChain(reason)),
                    StatusCheck::Pending => Err(LanderError::Expired {
                        height,
                        expiry_height,
                    }),
                };
            }
            if deadline.expired() {
                return Err(LanderError::ConfirmTimeout {
                    signature: signature.to_string(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline.remaining())).await;
        }
    }

    async fn balance(&self, owner: &Pubkey) -> Result<u64, LanderError> {
        Ok(self.client.get_balance(owner).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lander(url: &str) -> RpcLander {
        RpcLander::new(
            Arc::new(RpcClient::new_mock(url.to_string())),
            CommitmentConfig::confirmed(),
        )
        .with_confirmation(Duration::from_millis(50), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn confirm_succeeds_when_status_is_final() {
        lander("succeeds")
            .confirm(&Signature::default(), u64::MAX)
            .await
            .expect("confirmed");
    }

    #[tokio::test]
    async fn confirm_reports_on_chain_error() {
        let err = lander("account_in_use")
            .confirm(&Signature::default(), u64::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, LanderError::OnChain(_)));
    }

    #[tokio::test]
    async fn missing_status_past_expiry_is_expired() {
        let err = lander("sig_not_found")
            .confirm(&Signature::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LanderError::Expired { expiry_height: 0, .. }));
    }
}
