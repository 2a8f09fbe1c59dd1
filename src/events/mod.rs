use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the engine after a transaction commits.
///
/// Senders never block a database transaction on delivery; every event is
/// published after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartLineStaged {
        cart_id: Uuid,
        product_name: String,
        quantity: i32,
    },
    CartApproved {
        cart_id: Uuid,
        approved_by: String,
        override_used: bool,
    },
    CartExpired(Uuid),

    // Inventory events
    InventoryDeducted {
        item_id: Uuid,
        amount: i32,
        remaining: i32,
    },
    /// Clamped override deduction; `pre_quantity`/`post_quantity` preserve
    /// the true shortfall the persisted state can no longer reconstruct.
    InventoryForceDeducted {
        item_id: Uuid,
        requested: i32,
        pre_quantity: i32,
        post_quantity: i32,
    },
    InventoryQuantitySet {
        item_id: Uuid,
        quantity: i32,
    },

    // Catalog events
    ItemCreated {
        item_id: Uuid,
        product_name: String,
    },
    ReferenceMerged {
        kind: String,
        merged_into: Uuid,
        repointed: u64,
    },
    ItemsMerged {
        kept_item_id: Uuid,
        removed_item_id: Uuid,
        combined_quantity: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, downgrading a delivery failure to a warning.
    ///
    /// Engine operations have already committed by the time they publish,
    /// so a full event channel must not fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event delivery failed: {}", e);
        }
    }
}

/// Consumes engine events and logs them.
///
/// Downstream collaborators (export generators, notification fan-out) hang
/// off this loop; the engine itself only observes delivery failures.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CartApproved {
                cart_id,
                approved_by,
                override_used,
            } => {
                info!(
                    cart_id = %cart_id,
                    approved_by = %approved_by,
                    override_used = override_used,
                    "Cart approved"
                );
            }
            Event::InventoryForceDeducted {
                item_id,
                requested,
                pre_quantity,
                post_quantity,
            } => {
                // Audit record for the clamped path; the deficit is not
                // recoverable from persisted state afterwards.
                warn!(
                    item_id = %item_id,
                    requested = requested,
                    pre_quantity = pre_quantity,
                    post_quantity = post_quantity,
                    deficit = (requested - pre_quantity).max(0),
                    "Inventory force-deducted past available stock"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
