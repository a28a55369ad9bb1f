use tracing::info;

use stockflow_core::ProductId;
use stockflow_inventory::{NewProduct, Product, ProductFilter};

use super::{Change, ChangeOp, ChangeOrigin, ServiceContext, ServiceError};
use crate::cache::CacheKind;

/// Product mutations drop every snapshot: inventory and movement listings embed
/// product references.
#[derive(Clone)]
pub struct ProductService {
    ctx: ServiceContext,
}

impl ProductService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, ServiceError> {
        self.ctx
            .cached_list(CacheKind::Product, filter.is_empty(), || {
                self.ctx.store.list_products(filter)
            })
            .await
    }

    pub async fn get(&self, id: ProductId) -> Result<Product, ServiceError> {
        self.ctx
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))
    }

    pub async fn create(&self, new: NewProduct, origin: &ChangeOrigin) -> Result<Product, ServiceError> {
        new.validate()?;
        let product = self.ctx.store.create_product(new).await?;
        info!(product_id = %product.id, sku = %product.sku, "product created");

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Product,
                    op: ChangeOp::Created,
                    id: product.id.get(),
                    affects: None,
                },
                origin,
            )
            .await;
        Ok(product)
    }

    pub async fn delete(&self, id: ProductId, origin: &ChangeOrigin) -> Result<(), ServiceError> {
        if !self.ctx.store.delete_product(id).await? {
            return Err(ServiceError::NotFound(format!("product {id}")));
        }
        info!(product_id = %id, "product deleted");

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Product,
                    op: ChangeOp::Deleted,
                    id: id.get(),
                    affects: None,
                },
                origin,
            )
            .await;
        Ok(())
    }
}
