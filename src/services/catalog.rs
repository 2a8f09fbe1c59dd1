use crate::{
    entities::{brand, category, inventory, item, vendor, Inventory, Item},
    errors::ServiceError,
    events::{Event, EventSender},
};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// The closed set of shared reference kinds.
///
/// Each variant maps at compile time to its entity accessors via
/// [`ReferenceEntity`], so a typo in a kind name is a build failure rather
/// than a runtime table lookup miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Vendor,
    Category,
    Brand,
}

impl CatalogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogKind::Vendor => "vendor",
            CatalogKind::Category => "category",
            CatalogKind::Brand => "brand",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage accessors for one reference kind.
pub(crate) trait ReferenceEntity: EntityTrait {
    type ActiveModel: ActiveModelTrait<Entity = Self> + Send;

    const KIND: CatalogKind;

    fn id_column() -> <Self as EntityTrait>::Column;
    fn name_column() -> <Self as EntityTrait>::Column;
    /// The item column holding this kind's foreign key.
    fn item_fk_column() -> item::Column;
    fn new_row(id: Uuid, name: &str) -> <Self as ReferenceEntity>::ActiveModel;
    fn id_of(model: &<Self as EntityTrait>::Model) -> Uuid;
    fn name_of(model: &<Self as EntityTrait>::Model) -> String;
}

impl ReferenceEntity for vendor::Entity {
    type ActiveModel = vendor::ActiveModel;

    const KIND: CatalogKind = CatalogKind::Vendor;

    fn id_column() -> vendor::Column {
        vendor::Column::Id
    }

    fn name_column() -> vendor::Column {
        vendor::Column::Name
    }

    fn item_fk_column() -> item::Column {
        item::Column::VendorId
    }

    fn new_row(id: Uuid, name: &str) -> vendor::ActiveModel {
        vendor::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
        }
    }

    fn id_of(model: &vendor::Model) -> Uuid {
        model.id
    }

    fn name_of(model: &vendor::Model) -> String {
        model.name.clone()
    }
}

impl ReferenceEntity for category::Entity {
    type ActiveModel = category::ActiveModel;

    const KIND: CatalogKind = CatalogKind::Category;

    fn id_column() -> category::Column {
        category::Column::Id
    }

    fn name_column() -> category::Column {
        category::Column::Name
    }

    fn item_fk_column() -> item::Column {
        item::Column::CategoryId
    }

    fn new_row(id: Uuid, name: &str) -> category::ActiveModel {
        category::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
        }
    }

    fn id_of(model: &category::Model) -> Uuid {
        model.id
    }

    fn name_of(model: &category::Model) -> String {
        model.name.clone()
    }
}

impl ReferenceEntity for brand::Entity {
    type ActiveModel = brand::ActiveModel;

    const KIND: CatalogKind = CatalogKind::Brand;

    fn id_column() -> brand::Column {
        brand::Column::Id
    }

    fn name_column() -> brand::Column {
        brand::Column::Name
    }

    fn item_fk_column() -> item::Column {
        item::Column::BrandId
    }

    fn new_row(id: Uuid, name: &str) -> brand::ActiveModel {
        brand::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
        }
    }

    fn id_of(model: &brand::Model) -> Uuid {
        model.id
    }

    fn name_of(model: &brand::Model) -> String {
        model.name.clone()
    }
}

pub(crate) async fn resolve_reference<E, C>(db: &C, name: &str) -> Result<Option<E::Model>, DbErr>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    E::find().filter(E::name_column().eq(name)).one(db).await
}

/// Get-or-insert for one reference row.
///
/// The unique index on the name column is the arbiter under concurrency:
/// a lost insert race surfaces as `RecordNotInserted`, after which the
/// surviving row is re-read.
pub(crate) async fn get_or_create_reference<E, C>(db: &C, name: &str) -> Result<Uuid, ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    if let Some(existing) = resolve_reference::<E, _>(db, name).await? {
        return Ok(E::id_of(&existing));
    }

    let id = Uuid::new_v4();
    match E::insert(E::new_row(id, name))
        .on_conflict(OnConflict::column(E::name_column()).do_nothing().to_owned())
        .exec(db)
        .await
    {
        Ok(_) => Ok(id),
        Err(DbErr::RecordNotInserted) => {
            let existing = resolve_reference::<E, _>(db, name).await?.ok_or_else(|| {
                ServiceError::NotFound(format!("{} '{}'", E::KIND, name))
            })?;
            Ok(E::id_of(&existing))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn rename_reference_rows<E, C>(
    db: &C,
    old: &str,
    new: &str,
) -> Result<u64, ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    if old != new && resolve_reference::<E, _>(db, new).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "{} '{}' already exists; merge instead of renaming",
            E::KIND,
            new
        )));
    }

    let result = E::update_many()
        .col_expr(E::name_column(), Expr::value(new))
        .filter(E::name_column().eq(old))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub(crate) async fn count_item_references<E, C>(db: &C, id: Uuid) -> Result<u64, ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    let count = Item::find()
        .filter(E::item_fk_column().eq(id))
        .count(db)
        .await?;
    Ok(count)
}

pub(crate) async fn delete_reference_row<E, C>(db: &C, id: Uuid) -> Result<u64, ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    let result = E::delete_many()
        .filter(E::id_column().eq(id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub(crate) async fn list_reference_names<E, C>(db: &C) -> Result<Vec<String>, ServiceError>
where
    E: ReferenceEntity,
    C: ConnectionTrait,
{
    let rows = E::find().order_by_asc(E::name_column()).all(db).await?;
    Ok(rows.iter().map(E::name_of).collect())
}

pub(crate) async fn find_item_by_name<C>(db: &C, name: &str) -> Result<Option<item::Model>, DbErr>
where
    C: ConnectionTrait,
{
    Item::find()
        .filter(item::Column::ProductName.eq(name))
        .one(db)
        .await
}

/// New catalog item with its opening stock.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewItemInput {
    #[validate(length(min = 1, message = "product name must not be empty"))]
    pub product_name: String,
    pub cost: Decimal,
    #[validate(length(min = 1, message = "vendor must not be empty"))]
    pub vendor: String,
    #[validate(length(min = 1, message = "category must not be empty"))]
    pub category: String,
    #[validate(length(min = 1, message = "brand must not be empty"))]
    pub brand: String,
    #[validate(range(min = 0, message = "quantity must not be negative"))]
    pub quantity: i32,
}

/// One row of the read-only stock overview.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    pub item: item::Model,
    pub quantity: i32,
}

/// Catalog store: identity and name mappings for vendors, categories,
/// brands and items.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Looks up a reference row by exact name, creating it when absent.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, kind: CatalogKind, name: &str) -> Result<Uuid, ServiceError> {
        match kind {
            CatalogKind::Vendor => get_or_create_reference::<vendor::Entity, _>(&*self.db, name).await,
            CatalogKind::Category => {
                get_or_create_reference::<category::Entity, _>(&*self.db, name).await
            }
            CatalogKind::Brand => get_or_create_reference::<brand::Entity, _>(&*self.db, name).await,
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve_id(&self, kind: CatalogKind, name: &str) -> Result<Uuid, ServiceError> {
        let id = match kind {
            CatalogKind::Vendor => resolve_reference::<vendor::Entity, _>(&*self.db, name)
                .await?
                .map(|m| m.id),
            CatalogKind::Category => resolve_reference::<category::Entity, _>(&*self.db, name)
                .await?
                .map(|m| m.id),
            CatalogKind::Brand => resolve_reference::<brand::Entity, _>(&*self.db, name)
                .await?
                .map(|m| m.id),
        };
        id.ok_or_else(|| ServiceError::NotFound(format!("{} '{}'", kind, name)))
    }

    /// Renames a reference row in place.
    ///
    /// Returns the number of rows changed (zero when `old` does not
    /// exist); refuses with `Conflict` when `new` already names a
    /// different row of the same kind.
    #[instrument(skip(self))]
    pub async fn rename(&self, kind: CatalogKind, old: &str, new: &str) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;
        let changed = match kind {
            CatalogKind::Vendor => rename_reference_rows::<vendor::Entity, _>(&txn, old, new).await?,
            CatalogKind::Category => {
                rename_reference_rows::<category::Entity, _>(&txn, old, new).await?
            }
            CatalogKind::Brand => rename_reference_rows::<brand::Entity, _>(&txn, old, new).await?,
        };
        txn.commit().await?;

        if changed > 0 {
            info!("Renamed {} '{}' to '{}'", kind, old, new);
        }
        Ok(changed)
    }

    pub async fn list_names(&self, kind: CatalogKind) -> Result<Vec<String>, ServiceError> {
        match kind {
            CatalogKind::Vendor => list_reference_names::<vendor::Entity, _>(&*self.db).await,
            CatalogKind::Category => list_reference_names::<category::Entity, _>(&*self.db).await,
            CatalogKind::Brand => list_reference_names::<brand::Entity, _>(&*self.db).await,
        }
    }

    /// Creates an item together with its inventory row, get-or-creating
    /// the three references, as one transaction.
    #[instrument(skip(self, input), fields(product_name = %input.product_name))]
    pub async fn add_item(&self, input: NewItemInput) -> Result<item::Model, ServiceError> {
        input.validate()?;
        if input.cost < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "cost must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        if find_item_by_name(&txn, &input.product_name).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "item '{}' already exists",
                input.product_name
            )));
        }

        let vendor_id = get_or_create_reference::<vendor::Entity, _>(&txn, &input.vendor).await?;
        let category_id =
            get_or_create_reference::<category::Entity, _>(&txn, &input.category).await?;
        let brand_id = get_or_create_reference::<brand::Entity, _>(&txn, &input.brand).await?;

        let item_id = Uuid::new_v4();
        let item = item::ActiveModel {
            id: Set(item_id),
            product_name: Set(input.product_name.clone()),
            cost: Set(input.cost),
            vendor_id: Set(vendor_id),
            category_id: Set(category_id),
            brand_id: Set(brand_id),
        }
        .insert(&txn)
        .await?;

        inventory::ActiveModel {
            item_id: Set(item_id),
            quantity: Set(input.quantity),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ItemCreated {
                item_id,
                product_name: item.product_name.clone(),
            })
            .await;

        info!("Created item '{}' ({})", item.product_name, item_id);
        Ok(item)
    }

    pub async fn get_item(&self, product_name: &str) -> Result<item::Model, ServiceError> {
        find_item_by_name(&*self.db, product_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("item '{}'", product_name)))
    }

    pub async fn list_items_by_category(
        &self,
        category_name: &str,
    ) -> Result<Vec<item::Model>, ServiceError> {
        let category = resolve_reference::<category::Entity, _>(&*self.db, category_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("category '{}'", category_name)))?;

        let items = Item::find()
            .filter(item::Column::CategoryId.eq(category.id))
            .order_by_asc(item::Column::ProductName)
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Read-only stock overview for export and report collaborators.
    pub async fn list_inventory(&self) -> Result<Vec<StockLevel>, ServiceError> {
        let rows = Item::find()
            .find_also_related(Inventory)
            .order_by_asc(item::Column::ProductName)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(item, inv)| StockLevel {
                quantity: inv.map(|row| row.quantity).unwrap_or(0),
                item,
            })
            .collect())
    }
}
