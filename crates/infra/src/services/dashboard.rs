use serde::{Deserialize, Serialize};

use stockflow_inventory::MovementRecord;

use super::{ServiceContext, ServiceError};

pub const DEFAULT_RECENT_LIMIT: usize = 5;
pub const MAX_RECENT_LIMIT: usize = 100;

/// Headline numbers for the dashboard page.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounts {
    pub warehouses: u64,
    pub products: u64,
    pub inventory: u64,
    pub transactions: u64,
    pub zero_quantity_inventory: u64,
}

#[derive(Clone)]
pub struct DashboardService {
    ctx: ServiceContext,
}

impl DashboardService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn counts(&self) -> Result<DashboardCounts, ServiceError> {
        let counts = self.ctx.store.counts().await?;
        Ok(DashboardCounts {
            warehouses: counts.warehouses,
            products: counts.products,
            inventory: counts.inventory,
            transactions: counts.transactions,
            zero_quantity_inventory: counts.zero_quantity,
        })
    }

    /// Newest movements first; `limit` defaults to 5 and is capped at 100.
    pub async fn recent_transactions(&self, limit: Option<usize>) -> Result<Vec<MovementRecord>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT);
        Ok(self.ctx.store.recent_movements(limit).await?)
    }
}
