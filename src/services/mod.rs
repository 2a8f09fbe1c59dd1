/// Engine services
pub mod approvals;
pub mod carts;
pub mod catalog;
pub mod inventory;
pub mod normalizer;

pub use approvals::{Approval, ApprovalService};
pub use carts::{AddLineItemInput, CartService};
pub use catalog::{CatalogKind, CatalogService, NewItemInput};
pub use inventory::{DeductOutcome, InventoryService};
pub use normalizer::{MergeOutcome, NormalizerService};
