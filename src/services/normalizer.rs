use crate::auth::{require_admin, Identity};
use crate::entities::{brand, category, inventory, item, vendor, Inventory, Item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::catalog::{self, CatalogKind, ReferenceEntity};
use crate::services::inventory as ledger;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Result of a reference merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Items repointed from the losing row to the surviving row.
    pub repointed: u64,
    /// Rows removed (zero when the losing name did not exist).
    pub deleted: u64,
}

/// Catalog normalizer: administrative rename/merge/delete operations that
/// keep the referential structure intact.
///
/// Every operation requires the admin role and runs as one transaction,
/// so a racing rename or merge on the same entity can never leave an item
/// pointing at a deleted id.
#[derive(Clone)]
pub struct NormalizerService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

async fn merge_references_in<E, C>(
    db: &C,
    old_name: &str,
    new_name: &str,
) -> Result<(Uuid, MergeOutcome), ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    let target = catalog::resolve_reference::<E, _>(db, new_name)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("{} '{}'", E::KIND, new_name)))?;
    let target_id = E::id_of(&target);

    let Some(source) = catalog::resolve_reference::<E, _>(db, old_name).await? else {
        return Ok((
            target_id,
            MergeOutcome {
                repointed: 0,
                deleted: 0,
            },
        ));
    };
    let source_id = E::id_of(&source);

    if source_id == target_id {
        return Err(ServiceError::InvalidInput(format!(
            "cannot merge {} '{}' into itself",
            E::KIND,
            old_name
        )));
    }

    let repointed = Item::update_many()
        .col_expr(E::item_fk_column(), Expr::value(target_id))
        .filter(E::item_fk_column().eq(source_id))
        .exec(db)
        .await?
        .rows_affected;

    let deleted = catalog::delete_reference_row::<E, _>(db, source_id).await?;

    Ok((target_id, MergeOutcome { repointed, deleted }))
}

async fn delete_unused_reference_in<E, C>(db: &C, name: &str) -> Result<bool, ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    let row = catalog::resolve_reference::<E, _>(db, name)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("{} '{}'", E::KIND, name)))?;
    let id = E::id_of(&row);

    if catalog::count_item_references::<E, _>(db, id).await? > 0 {
        return Ok(false);
    }

    catalog::delete_reference_row::<E, _>(db, id).await?;
    Ok(true)
}

async fn item_by_name<C>(db: &C, name: &str) -> Result<item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    catalog::find_item_by_name(db, name)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("item '{}'", name)))
}

impl NormalizerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Renames a vendor/category/brand in place; items keep their foreign
    /// keys and follow the new name.
    #[instrument(skip(self, actor))]
    pub async fn rename_reference(
        &self,
        actor: &Identity,
        kind: CatalogKind,
        old: &str,
        new: &str,
    ) -> Result<u64, ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;
        let changed = match kind {
            CatalogKind::Vendor => {
                catalog::rename_reference_rows::<vendor::Entity, _>(&txn, old, new).await?
            }
            CatalogKind::Category => {
                catalog::rename_reference_rows::<category::Entity, _>(&txn, old, new).await?
            }
            CatalogKind::Brand => {
                catalog::rename_reference_rows::<brand::Entity, _>(&txn, old, new).await?
            }
        };
        txn.commit().await?;

        if changed > 0 {
            info!("Renamed {} '{}' to '{}'", kind, old, new);
        }
        Ok(changed)
    }

    /// Renames an item. Historical cart lines keep the old string and
    /// surface as unresolved at approval; see `merge_duplicate_items`.
    #[instrument(skip(self, actor))]
    pub async fn rename_item(
        &self,
        actor: &Identity,
        old: &str,
        new: &str,
    ) -> Result<u64, ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;

        if old != new && catalog::find_item_by_name(&txn, new).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "item '{}' already exists; merge instead of renaming",
                new
            )));
        }

        let changed = Item::update_many()
            .col_expr(item::Column::ProductName, Expr::value(new))
            .filter(item::Column::ProductName.eq(old))
            .exec(&txn)
            .await?
            .rows_affected;

        txn.commit().await?;

        if changed > 0 {
            info!("Renamed item '{}' to '{}'", old, new);
        }
        Ok(changed)
    }

    /// Repoints every item referencing `old_name` to `new_name`'s row,
    /// then deletes the losing row. The target must already exist;
    /// merging into a nonexistent name is rejected, not auto-created.
    #[instrument(skip(self, actor))]
    pub async fn merge_references(
        &self,
        actor: &Identity,
        kind: CatalogKind,
        old_name: &str,
        new_name: &str,
    ) -> Result<MergeOutcome, ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;
        let (target_id, outcome) = match kind {
            CatalogKind::Vendor => {
                merge_references_in::<vendor::Entity, _>(&txn, old_name, new_name).await?
            }
            CatalogKind::Category => {
                merge_references_in::<category::Entity, _>(&txn, old_name, new_name).await?
            }
            CatalogKind::Brand => {
                merge_references_in::<brand::Entity, _>(&txn, old_name, new_name).await?
            }
        };
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReferenceMerged {
                kind: kind.as_str().to_string(),
                merged_into: target_id,
                repointed: outcome.repointed,
            })
            .await;

        info!(
            "Merged {} '{}' into '{}': {} item(s) repointed",
            kind, old_name, new_name, outcome.repointed
        );
        Ok(outcome)
    }

    /// Folds a duplicate item into the one being kept.
    ///
    /// Quantities combine additively; this is the one place two inventory
    /// rows merge rather than overwrite. Cart history referencing the
    /// removed name by string is left dangling and surfaces as an
    /// unresolved product at approval.
    #[instrument(skip(self, actor))]
    pub async fn merge_duplicate_items(
        &self,
        actor: &Identity,
        keep: &str,
        remove: &str,
    ) -> Result<i32, ServiceError> {
        require_admin(actor)?;

        if keep == remove {
            return Err(ServiceError::InvalidInput(format!(
                "cannot merge item '{}' into itself",
                keep
            )));
        }

        let txn = self.db.begin().await?;

        let keep_item = item_by_name(&txn, keep).await?;
        let remove_item = item_by_name(&txn, remove).await?;

        let remove_quantity = ledger::quantity_of(&txn, remove_item.id).await?.unwrap_or(0);

        let combined = match ledger::quantity_of(&txn, keep_item.id).await? {
            Some(keep_quantity) => {
                let combined = keep_quantity + remove_quantity;
                ledger::set_quantity_on(&txn, keep_item.id, combined).await?;
                combined
            }
            None => {
                inventory::ActiveModel {
                    item_id: Set(keep_item.id),
                    quantity: Set(remove_quantity),
                }
                .insert(&txn)
                .await?;
                remove_quantity
            }
        };

        Inventory::delete_many()
            .filter(inventory::Column::ItemId.eq(remove_item.id))
            .exec(&txn)
            .await?;
        Item::delete_by_id(remove_item.id).exec(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ItemsMerged {
                kept_item_id: keep_item.id,
                removed_item_id: remove_item.id,
                combined_quantity: combined,
            })
            .await;

        info!(
            "Merged item '{}' into '{}': surviving quantity {}",
            remove, keep, combined
        );
        Ok(combined)
    }

    /// Deletes an item only when it has no inventory row; otherwise a
    /// no-op returning false.
    #[instrument(skip(self, actor))]
    pub async fn delete_unused_item(
        &self,
        actor: &Identity,
        name: &str,
    ) -> Result<bool, ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;
        let item_row = item_by_name(&txn, name).await?;

        if Inventory::find_by_id(item_row.id).one(&txn).await?.is_some() {
            return Ok(false);
        }

        Item::delete_by_id(item_row.id).exec(&txn).await?;
        txn.commit().await?;

        info!("Deleted unused item '{}'", name);
        Ok(true)
    }

    /// Deletes a vendor/category/brand only when zero items reference it;
    /// never cascades.
    #[instrument(skip(self, actor))]
    pub async fn delete_unused_reference(
        &self,
        actor: &Identity,
        kind: CatalogKind,
        name: &str,
    ) -> Result<bool, ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;
        let deleted = match kind {
            CatalogKind::Vendor => delete_unused_reference_in::<vendor::Entity, _>(&txn, name).await?,
            CatalogKind::Category => {
                delete_unused_reference_in::<category::Entity, _>(&txn, name).await?
            }
            CatalogKind::Brand => delete_unused_reference_in::<brand::Entity, _>(&txn, name).await?,
        };
        txn.commit().await?;

        if deleted {
            info!("Deleted unused {} '{}'", kind, name);
        }
        Ok(deleted)
    }

    /// Repoints an item's vendor, category and brand, all three or none.
    #[instrument(skip(self, actor))]
    pub async fn reassign_item_details(
        &self,
        actor: &Identity,
        item_name: &str,
        vendor_name: &str,
        category_name: &str,
        brand_name: &str,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;
        let item_row = item_by_name(&txn, item_name).await?;

        let vendor_row = catalog::resolve_reference::<vendor::Entity, _>(&txn, vendor_name).await?;
        let category_row =
            catalog::resolve_reference::<category::Entity, _>(&txn, category_name).await?;
        let brand_row = catalog::resolve_reference::<brand::Entity, _>(&txn, brand_name).await?;

        let mut missing = Vec::new();
        if vendor_row.is_none() {
            missing.push(format!("vendor '{}'", vendor_name));
        }
        if category_row.is_none() {
            missing.push(format!("category '{}'", category_name));
        }
        if brand_row.is_none() {
            missing.push(format!("brand '{}'", brand_name));
        }

        let (Some(vendor_row), Some(category_row), Some(brand_row)) =
            (vendor_row, category_row, brand_row)
        else {
            return Err(ServiceError::UnresolvedReference(missing.join(", ")));
        };

        let mut active: item::ActiveModel = item_row.into();
        active.vendor_id = Set(vendor_row.id);
        active.category_id = Set(category_row.id);
        active.brand_id = Set(brand_row.id);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(
            "Reassigned item '{}' to vendor '{}', category '{}', brand '{}'",
            item_name, vendor_name, category_name, brand_name
        );
        Ok(())
    }

    #[instrument(skip(self, actor))]
    pub async fn update_cost(
        &self,
        actor: &Identity,
        item_name: &str,
        new_cost: Decimal,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;

        if new_cost < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "cost must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let item_row = item_by_name(&txn, item_name).await?;

        let mut active: item::ActiveModel = item_row.into();
        active.cost = Set(new_cost);
        active.update(&txn).await?;

        txn.commit().await?;

        info!("Updated cost of item '{}' to {}", item_name, new_cost);
        Ok(())
    }

    #[instrument(skip(self, actor))]
    pub async fn update_quantity(
        &self,
        actor: &Identity,
        item_name: &str,
        new_quantity: i32,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;

        if new_quantity < 0 {
            return Err(ServiceError::InvalidInput(
                "quantity must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let item_row = item_by_name(&txn, item_name).await?;
        ledger::set_quantity_on(&txn, item_row.id, new_quantity).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::InventoryQuantitySet {
                item_id: item_row.id,
                quantity: new_quantity,
            })
            .await;

        info!(
            "Updated inventory of item '{}' to {}",
            item_name, new_quantity
        );
        Ok(())
    }

    /// Deletes an item together with its inventory row.
    #[instrument(skip(self, actor))]
    pub async fn remove_item_and_inventory(
        &self,
        actor: &Identity,
        name: &str,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;

        let txn = self.db.begin().await?;
        let item_row = item_by_name(&txn, name).await?;

        Inventory::delete_many()
            .filter(inventory::Column::ItemId.eq(item_row.id))
            .exec(&txn)
            .await?;
        Item::delete_by_id(item_row.id).exec(&txn).await?;

        txn.commit().await?;

        info!("Removed item '{}' and its inventory", name);
        Ok(())
    }
}
