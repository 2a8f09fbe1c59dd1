use crate::entities::{cart, cart_item, Cart, CartItem, CartStatus};
use crate::errors::{CartPhase, ServiceError};
use crate::events::{Event, EventSender};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Requested product and quantity for one cart line.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddLineItemInput {
    #[validate(length(min = 1, message = "product name must not be empty"))]
    pub product_name: String,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
}

/// Cart aggregate: creation, line-item staging, and pending listings.
///
/// Approval and expiry live in the approval engine; this service never
/// touches inventory.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn create_cart(&self) -> Result<cart::Model, ServiceError> {
        let cart_id = Uuid::new_v4();
        let now = Utc::now();

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            status: Set(CartStatus::Pending),
            approved_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!("Created cart: {}", cart_id);
        Ok(cart)
    }

    /// Stages a line item on a pending cart.
    ///
    /// The product name is stored as given; resolution against the catalog
    /// happens at approval time, so staging an unknown name succeeds here
    /// and fails there.
    #[instrument(skip(self, input), fields(product_name = %input.product_name))]
    pub async fn add_line_item(
        &self,
        cart_id: Uuid,
        input: AddLineItemInput,
    ) -> Result<Uuid, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {}", cart_id)))?;

        match cart.status {
            CartStatus::Pending => {}
            CartStatus::Completed => return Err(ServiceError::InvalidState(CartPhase::Completed)),
            CartStatus::Expired => return Err(ServiceError::InvalidState(CartPhase::Expired)),
        }

        let staged = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .count(&txn)
            .await?;

        let line_id = Uuid::new_v4();
        cart_item::ActiveModel {
            id: Set(line_id),
            cart_id: Set(cart_id),
            product_name: Set(input.product_name.clone()),
            quantity: Set(input.quantity),
            position: Set(staged as i32 + 1),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartLineStaged {
                cart_id,
                product_name: input.product_name.clone(),
                quantity: input.quantity,
            })
            .await;

        info!(
            "Staged line on cart {}: '{}' x{}",
            cart_id, input.product_name, input.quantity
        );
        Ok(line_id)
    }

    /// Line items of a cart in staging order.
    pub async fn list_line_items(&self, cart_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {}", cart_id)))?;

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::Position)
            .all(&*self.db)
            .await?;
        Ok(lines)
    }

    /// Pending carts, newest first.
    pub async fn list_pending(&self) -> Result<Vec<cart::Model>, ServiceError> {
        let carts = Cart::find()
            .filter(cart::Column::Status.eq(CartStatus::Pending))
            .order_by_desc(cart::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(carts)
    }
}
