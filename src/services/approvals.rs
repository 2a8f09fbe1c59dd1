use crate::auth::{Identity, OverrideAuthorizer, OverrideCredential, SYSTEM_APPROVER};
use crate::entities::{cart, cart_item, item, Cart, CartItem, CartStatus};
use crate::errors::{CartPhase, ServiceError, StockShortfall};
use crate::events::{Event, EventSender};
use crate::services::catalog::find_item_by_name;
use crate::services::inventory::{self as ledger, DeductOutcome};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of a successful approval.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub cart_id: Uuid,
    pub approved_by: String,
    pub override_used: bool,
}

/// Reservation/approval engine: drives the cart state machine
/// `pending -> {completed, expired}` against the inventory ledger.
#[derive(Clone)]
pub struct ApprovalService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    authorizer: Arc<dyn OverrideAuthorizer>,
}

impl ApprovalService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        authorizer: Arc<dyn OverrideAuthorizer>,
    ) -> Self {
        Self {
            db,
            event_sender,
            authorizer,
        }
    }

    /// Approves a pending cart, deducting every line from inventory and
    /// marking the cart completed as one atomic unit.
    ///
    /// Without an override credential every line must be fully available;
    /// any shortfall rejects the whole cart with the complete short-line
    /// list and leaves it pending. With a valid override credential the
    /// deductions are clamped at zero and the override identity is
    /// recorded as approver.
    #[instrument(skip(self, override_credential), fields(actor = %actor.id))]
    pub async fn approve_cart(
        &self,
        cart_id: Uuid,
        actor: &Identity,
        override_credential: Option<&OverrideCredential>,
    ) -> Result<Approval, ServiceError> {
        // The credential check calls out to the authorization gate, so it
        // runs before the transaction opens, never inside it.
        let approver = match override_credential {
            Some(credential) => {
                let ok = self
                    .authorizer
                    .verify_override(&credential.username, &credential.secret)
                    .await;
                if !ok {
                    return Err(ServiceError::Unauthorized(format!(
                        "override credential rejected for '{}'",
                        credential.username
                    )));
                }
                credential.username.clone()
            }
            None => SYSTEM_APPROVER.to_string(),
        };
        let override_used = override_credential.is_some();

        let txn = self.db.begin().await?;

        let cart_row = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {}", cart_id)))?;

        match cart_row.status {
            CartStatus::Pending => {}
            CartStatus::Completed => return Err(ServiceError::InvalidState(CartPhase::Completed)),
            CartStatus::Expired => return Err(ServiceError::InvalidState(CartPhase::Expired)),
        }

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::Position)
            .all(&txn)
            .await?;

        // Resolve every line to its catalog item in staging order. A name
        // that disappeared since staging (renamed or merged away) fails
        // the approval here, before any deduction.
        let mut resolved: Vec<(cart_item::Model, item::Model)> = Vec::with_capacity(lines.len());
        for line in lines {
            let item_row = find_item_by_name(&txn, &line.product_name)
                .await?
                .ok_or_else(|| ServiceError::UnresolvedProduct(line.product_name.clone()))?;
            resolved.push((line, item_row));
        }

        let mut deduction_events = Vec::with_capacity(resolved.len());

        if override_used {
            for (line, item_row) in &resolved {
                let (pre, post) = ledger::force_deduct_on(&txn, item_row.id, line.quantity).await?;
                if pre < line.quantity {
                    warn!(
                        cart_id = %cart_id,
                        product_name = %line.product_name,
                        requested = line.quantity,
                        available = pre,
                        deficit = line.quantity - pre,
                        "Override approval deducted past available stock"
                    );
                }
                deduction_events.push(Event::InventoryForceDeducted {
                    item_id: item_row.id,
                    requested: line.quantity,
                    pre_quantity: pre,
                    post_quantity: post,
                });
            }
        } else {
            // Walk the lines against a snapshot of the ledger first so a
            // rejection enumerates every short line, with repeated lines
            // for one product charged against a running balance.
            let mut balances: HashMap<Uuid, i32> = HashMap::new();
            for (_, item_row) in &resolved {
                if !balances.contains_key(&item_row.id) {
                    let quantity = ledger::quantity_of(&txn, item_row.id).await?.unwrap_or(0);
                    balances.insert(item_row.id, quantity);
                }
            }

            let mut shortfalls = Vec::new();
            for (line, item_row) in &resolved {
                let balance = balances.entry(item_row.id).or_insert(0);
                if *balance >= line.quantity {
                    *balance -= line.quantity;
                } else {
                    shortfalls.push(StockShortfall {
                        product_name: line.product_name.clone(),
                        requested: line.quantity,
                        available: *balance,
                    });
                }
            }

            if !shortfalls.is_empty() {
                txn.rollback().await?;
                return Err(ServiceError::InsufficientStock(shortfalls));
            }

            // The guarded deducts are the commit point; a miss means a
            // concurrent approval took the stock after our snapshot.
            for (line, item_row) in &resolved {
                match ledger::try_deduct_on(&txn, item_row.id, line.quantity).await? {
                    DeductOutcome::Applied { remaining } => {
                        deduction_events.push(Event::InventoryDeducted {
                            item_id: item_row.id,
                            amount: line.quantity,
                            remaining,
                        });
                    }
                    DeductOutcome::Insufficient { available } => {
                        let shortfall = StockShortfall {
                            product_name: line.product_name.clone(),
                            requested: line.quantity,
                            available,
                        };
                        txn.rollback().await?;
                        return Err(ServiceError::InsufficientStock(vec![shortfall]));
                    }
                }
            }
        }

        // Terminal transition, guarded on still observing `pending`, so
        // two racing approvals resolve to one success and one
        // InvalidState.
        let transition = Cart::update_many()
            .set(cart::ActiveModel {
                status: Set(CartStatus::Completed),
                approved_by: Set(Some(approver.clone())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Pending))
            .exec(&txn)
            .await?;

        if transition.rows_affected == 0 {
            txn.rollback().await?;
            let phase = match Cart::find_by_id(cart_id).one(&*self.db).await? {
                Some(current) if current.status == CartStatus::Expired => CartPhase::Expired,
                Some(_) => CartPhase::Completed,
                None => return Err(ServiceError::NotFound(format!("cart {}", cart_id))),
            };
            return Err(ServiceError::InvalidState(phase));
        }

        txn.commit().await?;

        for event in deduction_events {
            self.event_sender.send_or_log(event).await;
        }
        self.event_sender
            .send_or_log(Event::CartApproved {
                cart_id,
                approved_by: approver.clone(),
                override_used,
            })
            .await;

        info!(
            cart_id = %cart_id,
            approved_by = %approver,
            override_used = override_used,
            "Cart approved"
        );

        Ok(Approval {
            cart_id,
            approved_by: approver,
            override_used,
        })
    }

    /// Expires every pending cart idle past the given duration, deleting
    /// its line items. Idempotent: a second run with no newly eligible
    /// carts returns zero.
    ///
    /// Each cart transitions in its own transaction with a guard on
    /// `pending`, so a sweep racing an approval loses that cart cleanly
    /// instead of corrupting it.
    #[instrument(skip(self))]
    pub async fn sweep_expired_carts(
        &self,
        idle: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let cutoff = now - idle;

        let stale = Cart::find()
            .filter(cart::Column::Status.eq(CartStatus::Pending))
            .filter(cart::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut expired = 0u64;
        for cart_row in stale {
            let txn = self.db.begin().await?;

            let transition = Cart::update_many()
                .set(cart::ActiveModel {
                    status: Set(CartStatus::Expired),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(cart::Column::Id.eq(cart_row.id))
                .filter(cart::Column::Status.eq(CartStatus::Pending))
                .exec(&txn)
                .await?;

            if transition.rows_affected == 0 {
                // A concurrent approval won this cart.
                txn.rollback().await?;
                continue;
            }

            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart_row.id))
                .exec(&txn)
                .await?;

            txn.commit().await?;
            expired += 1;

            self.event_sender
                .send_or_log(Event::CartExpired(cart_row.id))
                .await;
        }

        if expired > 0 {
            info!(count = expired, "Expired stale carts");
        }
        Ok(expired)
    }
}
