/// Catalog, inventory and cart entities
pub mod brand;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod inventory;
pub mod item;
pub mod vendor;

// Re-export entities
pub use brand::{Entity as Brand, Model as BrandModel};
pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use inventory::{Entity as Inventory, Model as InventoryModel};
pub use item::{Entity as Item, Model as ItemModel};
pub use vendor::{Entity as Vendor, Model as VendorModel};
