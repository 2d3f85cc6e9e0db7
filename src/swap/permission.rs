//! Allowance state machine
//!
//! `NotNeeded -> ReadyForRequest -> InProgress -> NotNeeded`. A grant is tracked per
//! source asset and provider from the moment it is requested until a poll reports that no
//! allowance is required anymore, so quotes loaded in between keep showing `InProgress`.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{info, warn};

use super::fee::resolve_fee;
use crate::error::Error;
use crate::models::{
    ApproveType, AssetStatus, Fee, FeeInfo, FeeTier, PermissionState, Provider, SwapProcessState,
};
use crate::sources::{
    AllowanceStatus, ApprovalOutcome, ApprovalRequest, TransactionFacade, TxOutcome,
};
use crate::utils::lock;

#[derive(Default)]
pub struct PermissionFlowController {
    in_progress: Mutex<HashSet<String>>,
}

fn grant_key(asset_id: &str, provider_id: &str) -> String {
    format!("{}:{}", asset_id, provider_id)
}

impl PermissionFlowController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the permission state of a freshly loaded quote
    pub fn permission_state(
        &self,
        provider: &Provider,
        from: &AssetStatus,
        allowance: &AllowanceStatus,
    ) -> PermissionState {
        let key = grant_key(&from.asset.id, &provider.provider_id);
        match allowance {
            AllowanceStatus::NotRequired => {
                if lock(&self.in_progress).remove(&key) {
                    info!(
                        provider = %provider.provider_id,
                        asset = %from.asset.id,
                        "Allowance granted"
                    );
                }
                PermissionState::NotNeeded
            }
            AllowanceStatus::Required(_) if !provider.supports_allowance() => {
                PermissionState::NotNeeded
            }
            // nothing to spend, an approval would be wasted
            AllowanceStatus::Required(_) if from.is_zero_balance() => PermissionState::NotNeeded,
            AllowanceStatus::Required(_) if lock(&self.in_progress).contains(&key) => {
                PermissionState::InProgress
            }
            AllowanceStatus::Required(data) => PermissionState::ReadyForRequest(data.clone()),
        }
    }

    pub fn is_in_progress(&self, asset_id: &str, provider_id: &str) -> bool {
        lock(&self.in_progress).contains(&grant_key(asset_id, provider_id))
    }

    fn mark_in_progress(&self, asset_id: &str, provider_id: &str) {
        lock(&self.in_progress).insert(grant_key(asset_id, provider_id));
    }

    fn clear(&self, asset_id: &str, provider_id: &str) {
        lock(&self.in_progress).remove(&grant_key(asset_id, provider_id));
    }

    /// Approval always pays the priority fee when the quote offers a choice
    pub fn approval_fee(fee_info: Option<&FeeInfo>) -> Result<Fee, Error> {
        fee_info
            .map(|info| resolve_fee(info, FeeTier::Priority))
            .ok_or_else(|| Error::FeeUnavailable("approval fee is missing".to_string()))
    }

    /// Check the preconditions of an approval against the session state
    pub fn prepare(
        state: &SwapProcessState,
        approve_type: ApproveType,
    ) -> Result<ApprovalRequest, Error> {
        let provider = state
            .selected_provider
            .clone()
            .ok_or(Error::MissingSelectedProvider)?;
        let from = state
            .from_asset
            .as_ref()
            .ok_or_else(|| Error::MissingAsset("source asset".to_string()))?;
        let approve_data = state
            .pending_approval_payload
            .clone()
            .ok_or(Error::MissingApprovalData)?;
        let fee = Self::approval_fee(approve_data.fee.as_ref())?;

        Ok(ApprovalRequest {
            provider,
            asset: from.asset.clone(),
            approve_data,
            approve_type,
            fee,
        })
    }

    /// Broadcast the approval. The grant stays in progress only when the transaction was
    /// sent; any other outcome returns the quote to `ReadyForRequest`.
    pub async fn give_permission(
        &self,
        transactions: &dyn TransactionFacade,
        request: &ApprovalRequest,
    ) -> ApprovalOutcome {
        let asset_id = request.asset.id.as_str();
        let provider_id = request.provider.provider_id.as_str();
        self.mark_in_progress(asset_id, provider_id);

        let outcome = match transactions.build_approval(request).await {
            Ok(outcome) => outcome,
            Err(e) => TxOutcome::Error {
                message: e.to_string(),
            },
        };

        match &outcome {
            TxOutcome::TxSent { tx_hash, .. } => {
                info!(
                    provider = %provider_id,
                    asset = %asset_id,
                    tx_hash = %tx_hash,
                    "Approval sent"
                );
            }
            TxOutcome::DemoMode => {
                self.clear(asset_id, provider_id);
            }
            TxOutcome::Error { message } => {
                warn!(
                    provider = %provider_id,
                    asset = %asset_id,
                    error = %message,
                    "Approval failed"
                );
                self.clear(asset_id, provider_id);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApproveData, Asset, ProviderType};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::sources::SwapRequest;

    struct FailingFacade;

    #[async_trait]
    impl TransactionFacade for FailingFacade {
        async fn build_and_send(&self, _request: &SwapRequest) -> Result<TxOutcome, Error> {
            Err(Error::Transaction("unused".to_string()))
        }

        async fn build_approval(
            &self,
            _request: &ApprovalRequest,
        ) -> Result<ApprovalOutcome, Error> {
            Err(Error::Transaction("rejected by node".to_string()))
        }
    }

    fn approve_data(fee: Option<FeeInfo>) -> ApproveData {
        ApproveData {
            spender_address: "0xrouter".to_string(),
            call_data: "0x095ea7b3".to_string(),
            fee,
            from_amount: Decimal::new(100, 0),
        }
    }

    fn usdt(balance: Decimal) -> AssetStatus {
        AssetStatus::new(
            Asset::token("usdt", "USDT", "Tether", 6, "ethereum", "0xdac17f"),
            Some(balance),
            Some(Decimal::ONE),
        )
    }

    #[test]
    fn test_state_from_allowance() {
        let controller = PermissionFlowController::new();
        let dex = Provider::new("oneinch", "1inch", ProviderType::Dex);
        let cex = Provider::new("changenow", "ChangeNOW", ProviderType::Cex);
        let required = AllowanceStatus::Required(approve_data(None));

        assert!(matches!(
            controller.permission_state(&dex, &usdt(Decimal::TEN), &required),
            PermissionState::ReadyForRequest(_)
        ));
        assert_eq!(
            controller.permission_state(&cex, &usdt(Decimal::TEN), &required),
            PermissionState::NotNeeded
        );
        assert_eq!(
            controller.permission_state(&dex, &usdt(Decimal::ZERO), &required),
            PermissionState::NotNeeded
        );
    }

    #[test]
    fn test_approval_fee_prefers_priority() {
        let info = FeeInfo::Choosable {
            minimum: Fee::new(Decimal::new(1, 2)),
            normal: Fee::new(Decimal::new(2, 2)),
            priority: Fee::new(Decimal::new(3, 2)),
        };
        let fee = PermissionFlowController::approval_fee(Some(&info)).unwrap();
        assert_eq!(fee.amount, Decimal::new(3, 2));

        let missing = PermissionFlowController::approval_fee(None);
        assert!(matches!(missing, Err(Error::FeeUnavailable(_))));
    }

    #[test]
    fn test_prepare_requires_approval_data() {
        let state = SwapProcessState {
            selected_provider: Some(Provider::new("oneinch", "1inch", ProviderType::Dex)),
            from_asset: Some(usdt(Decimal::TEN)),
            ..SwapProcessState::default()
        };
        let result = PermissionFlowController::prepare(&state, ApproveType::Unlimited);
        assert!(matches!(result, Err(Error::MissingApprovalData)));
    }

    #[tokio::test]
    async fn test_failed_grant_returns_to_ready() {
        let controller = PermissionFlowController::new();
        let provider = Provider::new("oneinch", "1inch", ProviderType::Dex);
        let from = usdt(Decimal::TEN);
        let request = ApprovalRequest {
            provider: provider.clone(),
            asset: from.asset.clone(),
            approve_data: approve_data(Some(FeeInfo::Single(Fee::new(Decimal::ONE)))),
            approve_type: ApproveType::Limited,
            fee: Fee::new(Decimal::ONE),
        };

        let outcome = controller.give_permission(&FailingFacade, &request).await;
        assert!(matches!(outcome, TxOutcome::Error { .. }));
        assert!(!controller.is_in_progress("usdt", "oneinch"));

        let required = AllowanceStatus::Required(approve_data(None));
        assert!(matches!(
            controller.permission_state(&provider, &from, &required),
            PermissionState::ReadyForRequest(_)
        ));
    }
}
