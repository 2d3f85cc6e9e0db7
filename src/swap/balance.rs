use rust_decimal::Decimal;
use tracing::debug;

use super::events::Side;
use crate::error::Error;
use crate::models::{Asset, AssetStatus};
use crate::sources::BalanceStream;
use crate::utils::SubscriptionSlot;

/// Live balance feed for one side of the swap.
///
/// Updates are forwarded only when the balance actually changed.
pub struct BalanceSubscription {
    side: Side,
    slot: SubscriptionSlot,
}

impl BalanceSubscription {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            slot: SubscriptionSlot::new(),
        }
    }

    /// Watch `asset`, replacing whatever this side watched before. Re-subscribing to the
    /// asset already watched is a no-op.
    pub fn subscribe<F>(
        &self,
        balances: &dyn BalanceStream,
        asset: &Asset,
        mut on_update: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Side, AssetStatus) + Send + 'static,
    {
        if self.slot.current_key().as_deref() == Some(asset.id.as_str()) {
            return Ok(());
        }

        let stream = balances.subscribe(asset)?;
        let side = self.side;
        let mut last: Option<Option<Decimal>> = None;
        debug!(?side, asset = %asset.id, "Subscribing to balance updates");

        self.slot.replace(asset.id.clone(), stream, move |status: AssetStatus| {
            if last == Some(status.balance) {
                return;
            }
            last = Some(status.balance);
            on_update(side, status);
        });
        Ok(())
    }

    pub fn cancel(&self) {
        self.slot.cancel();
    }

    pub fn watched_asset(&self) -> Option<String> {
        self.slot.current_key()
    }
}
