//! Unit catalog administration.

use rust_decimal::Decimal;
use tracing::instrument;

use millstock_core::{
    DomainError, ItemUomConversionId, TenantContext, UomCategoryId, UomConversionId, UomId,
    ensure_same_tenant,
};
use millstock_uom::{ItemUomConversion, NewItemUomConversion, Uom, UomCategory, UomConversion};

use crate::error::ServiceResult;
use crate::store::{CatalogRepository, ItemRepository, Store, UnitOfWork};

#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn create_category(&self, name: &str) -> ServiceResult<UomCategory> {
        let category = UomCategory::new(UomCategoryId::new(), name)?;
        let mut tx = self.store.begin().await?;
        tx.insert_category(&category).await?;
        tx.commit().await?;
        Ok(category)
    }

    #[instrument(skip(self), err)]
    pub async fn create_uom(
        &self,
        category_id: UomCategoryId,
        name: &str,
        symbol: &str,
    ) -> ServiceResult<Uom> {
        let mut tx = self.store.begin().await?;
        let category = tx.get_category(category_id).await?.ok_or(DomainError::NotFound)?;
        let uom = Uom::new(UomId::new(), &category, name, symbol)?;
        tx.insert_uom(&uom).await?;
        tx.commit().await?;
        Ok(uom)
    }

    #[instrument(skip(self), err)]
    pub async fn get_uom(&self, id: UomId) -> ServiceResult<Uom> {
        let mut tx = self.store.begin().await?;
        let uom = tx.get_uom(id).await?.ok_or(DomainError::NotFound)?;
        tx.commit().await?;
        Ok(uom)
    }

    #[instrument(skip(self), err)]
    pub async fn list_uoms(&self, category_id: Option<UomCategoryId>) -> ServiceResult<Vec<Uom>> {
        let mut tx = self.store.begin().await?;
        let uoms = tx.list_uoms(category_id).await?;
        tx.commit().await?;
        Ok(uoms)
    }

    /// Global conversion between two units of one category.
    #[instrument(skip(self), err)]
    pub async fn create_conversion(
        &self,
        from: UomId,
        to: UomId,
        factor: Decimal,
    ) -> ServiceResult<UomConversion> {
        let mut tx = self.store.begin().await?;
        let from_uom = tx.get_uom(from).await?.ok_or(DomainError::NotFound)?;
        let to_uom = tx.get_uom(to).await?.ok_or(DomainError::NotFound)?;
        let conversion = UomConversion::new(UomConversionId::new(), &from_uom, &to_uom, factor)?;
        tx.insert_conversion(&conversion).await?;
        tx.commit().await?;
        Ok(conversion)
    }

    /// Item-specific override; may cross categories.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn create_item_conversion(
        &self,
        ctx: &TenantContext,
        input: NewItemUomConversion,
    ) -> ServiceResult<ItemUomConversion> {
        let conversion = ItemUomConversion::new(ItemUomConversionId::new(), ctx.tenant_id(), input)?;

        let mut tx = self.store.begin().await?;
        let item = tx
            .get_item(ctx.tenant_id(), conversion.item_id)
            .await?
            .ok_or_else(|| DomainError::cross_tenant("converted item is not visible to the acting tenant"))?;
        ensure_same_tenant(ctx, &item, "converted item")?;
        tx.get_uom(conversion.from_uom_id).await?.ok_or(DomainError::NotFound)?;
        tx.get_uom(conversion.to_uom_id).await?.ok_or(DomainError::NotFound)?;
        tx.insert_item_conversion(&conversion).await?;
        tx.commit().await?;
        Ok(conversion)
    }
}
