use crate::entities::{inventory, Inventory, Item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Result of a guarded deduction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    Applied { remaining: i32 },
    Insufficient { available: i32 },
}

/// One depleted row in the low-stock report.
#[derive(Debug, Clone, Serialize)]
pub struct DepletedStock {
    pub product_name: String,
    pub quantity: i32,
}

pub(crate) async fn quantity_of<C>(db: &C, item_id: Uuid) -> Result<Option<i32>, DbErr>
where
    C: ConnectionTrait,
{
    Ok(Inventory::find_by_id(item_id)
        .one(db)
        .await?
        .map(|row| row.quantity))
}

/// Guarded deduction: checks and decrements in one statement.
///
/// The `quantity >= amount` guard makes the statement the linearization
/// point; a concurrent writer that got there first turns this call into
/// `Insufficient` rather than a lost update or a negative balance.
pub(crate) async fn try_deduct_on<C>(
    db: &C,
    item_id: Uuid,
    amount: i32,
) -> Result<DeductOutcome, ServiceError>
where
    C: ConnectionTrait,
{
    if amount < 0 {
        return Err(ServiceError::InvalidInput(
            "deduction amount must not be negative".to_string(),
        ));
    }

    let result = Inventory::update_many()
        .col_expr(
            inventory::Column::Quantity,
            Expr::col(inventory::Column::Quantity).sub(amount),
        )
        .filter(inventory::Column::ItemId.eq(item_id))
        .filter(inventory::Column::Quantity.gte(amount))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let available = quantity_of(db, item_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("inventory for item {}", item_id)))?;
        return Ok(DeductOutcome::Insufficient { available });
    }

    let remaining = quantity_of(db, item_id).await?.unwrap_or(0);
    Ok(DeductOutcome::Applied { remaining })
}

/// Unconditional deduction clamped at zero, applied in-statement so no
/// negative value is ever persisted. Returns `(pre, post)` so the caller
/// can record the true shortfall; the persisted state alone cannot.
pub(crate) async fn force_deduct_on<C>(
    db: &C,
    item_id: Uuid,
    amount: i32,
) -> Result<(i32, i32), ServiceError>
where
    C: ConnectionTrait,
{
    if amount < 0 {
        return Err(ServiceError::InvalidInput(
            "deduction amount must not be negative".to_string(),
        ));
    }

    let pre = quantity_of(db, item_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("inventory for item {}", item_id)))?;

    let clamped = Expr::case(
        Expr::col(inventory::Column::Quantity).gte(amount),
        Expr::col(inventory::Column::Quantity).sub(amount),
    )
    .finally(0);

    Inventory::update_many()
        .col_expr(inventory::Column::Quantity, clamped.into())
        .filter(inventory::Column::ItemId.eq(item_id))
        .exec(db)
        .await?;

    let post = quantity_of(db, item_id).await?.unwrap_or(0);
    Ok((pre, post))
}

pub(crate) async fn set_quantity_on<C>(
    db: &C,
    item_id: Uuid,
    value: i32,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if value < 0 {
        return Err(ServiceError::InvalidInput(
            "quantity must not be negative".to_string(),
        ));
    }

    let result = Inventory::update_many()
        .col_expr(inventory::Column::Quantity, Expr::value(value))
        .filter(inventory::Column::ItemId.eq(item_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "inventory for item {}",
            item_id
        )));
    }
    Ok(())
}

/// Inventory ledger: the single source of truth for available stock.
///
/// Every mutation goes through this module; nothing else in the crate
/// writes the quantity column.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_quantity(&self, item_id: Uuid) -> Result<i32, ServiceError> {
        quantity_of(&*self.db, item_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("inventory for item {}", item_id)))
    }

    #[instrument(skip(self))]
    pub async fn try_deduct(
        &self,
        item_id: Uuid,
        amount: i32,
    ) -> Result<DeductOutcome, ServiceError> {
        let outcome = try_deduct_on(&*self.db, item_id, amount).await?;

        if let DeductOutcome::Applied { remaining } = outcome {
            self.event_sender
                .send_or_log(Event::InventoryDeducted {
                    item_id,
                    amount,
                    remaining,
                })
                .await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn force_deduct(&self, item_id: Uuid, amount: i32) -> Result<(i32, i32), ServiceError> {
        let (pre, post) = force_deduct_on(&*self.db, item_id, amount).await?;

        self.event_sender
            .send_or_log(Event::InventoryForceDeducted {
                item_id,
                requested: amount,
                pre_quantity: pre,
                post_quantity: post,
            })
            .await;
        Ok((pre, post))
    }

    #[instrument(skip(self))]
    pub async fn set_quantity(&self, item_id: Uuid, value: i32) -> Result<(), ServiceError> {
        set_quantity_on(&*self.db, item_id, value).await?;

        self.event_sender
            .send_or_log(Event::InventoryQuantitySet {
                item_id,
                quantity: value,
            })
            .await;

        info!("Set inventory for item {} to {}", item_id, value);
        Ok(())
    }

    /// Items whose stock has reached or fallen past zero.
    #[instrument(skip(self))]
    pub async fn list_depleted(&self) -> Result<Vec<DepletedStock>, ServiceError> {
        let rows = Inventory::find()
            .filter(inventory::Column::Quantity.lte(0))
            .find_also_related(Item)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(inv, item)| {
                item.map(|item| DepletedStock {
                    product_name: item.product_name,
                    quantity: inv.quantity,
                })
            })
            .collect())
    }
}
