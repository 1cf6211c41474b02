use crate::{
    entities::{category, product, product_image},
    errors::ServiceError,
    services::contains_pattern,
    PaginatedResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Upper bound applied when a price filter has no maximum.
pub const MAX_PRICE_FILTER: Decimal = dec!(9999999999.99);

/// Catalog entry as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductDto {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "12500000")]
    pub price: Decimal,
    pub stock: i32,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub movement: Option<String>,
    pub case_material: Option<String>,
    pub strap_material: Option<String>,
    pub dial_color: Option<String>,
    pub water_resistance: Option<String>,
    pub category_id: i32,
    pub category_name: Option<String>,
    pub visible: bool,
    #[schema(value_type = String, example = "4.50")]
    pub average_rating: Decimal,
    pub review_count: i32,
    pub primary_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update payload for a product
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "positive_price")]
    #[schema(value_type = String, example = "12500000")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[validate(length(max = 50))]
    pub barcode: Option<String>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(length(max = 100))]
    pub model: Option<String>,
    #[validate(length(max = 50))]
    pub movement: Option<String>,
    #[validate(length(max = 50))]
    pub case_material: Option<String>,
    #[validate(length(max = 50))]
    pub strap_material: Option<String>,
    #[validate(length(max = 50))]
    pub dial_color: Option<String>,
    #[validate(length(max = 50))]
    pub water_resistance: Option<String>,
    #[validate(range(min = 1))]
    pub category_id: i32,
    /// When present, replaces the product's image set.
    pub image_urls: Option<Vec<String>>,
    pub primary_image_url: Option<String>,
    pub visible: Option<bool>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn positive_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

/// Catalog search criteria
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub category_id: Option<i32>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Restrict to products shown in the storefront.
    pub visible_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryEntry {
    pub product_id: i32,
    pub name: String,
    pub stock: i32,
}

/// Catalog service: browsing, filtering and admin maintenance of products.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Filters and paginates the catalog, newest first.
    ///
    /// A negative or absent minimum price is treated as zero and an absent
    /// maximum as [`MAX_PRICE_FILTER`]. Filtering by an unknown category is
    /// an error rather than an empty page.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        filter: ProductFilter,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ProductDto>, ServiceError> {
        if let Some(category_id) = filter.category_id {
            category::Entity::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Category", category_id))?;
        }

        let min_price = filter
            .min_price
            .filter(|p| !p.is_sign_negative())
            .unwrap_or(Decimal::ZERO);
        let max_price = filter
            .max_price
            .filter(|p| !p.is_sign_negative())
            .unwrap_or(MAX_PRICE_FILTER);

        let mut query = product::Entity::find()
            .filter(product::Column::Price.gte(min_price))
            .filter(product::Column::Price.lte(max_price));

        if filter.visible_only {
            query = query.filter(product::Column::Visible.eq(true));
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(name) = filter
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col((
                    product::Entity,
                    product::Column::Name,
                ))))
                .like(contains_pattern(name)),
            );
        }

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .order_by_desc(product::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.saturating_sub(1)).await?;
        let items = build_dtos(&*self.db, models).await?;

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    /// Loads one product. With `visible_only`, hidden products are reported as missing.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i32, visible_only: bool) -> Result<ProductDto, ServiceError> {
        let model = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|p| !visible_only || p.visible)
            .ok_or_else(|| ServiceError::not_found("Product", id))?;

        build_dto(&*self.db, model).await
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: ProductRequest) -> Result<ProductDto, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        ensure_category_exists(&txn, request.category_id).await?;
        ensure_barcode_free(&txn, request.barcode.as_deref(), None).await?;

        let now = Utc::now();
        let model = product::ActiveModel {
            name: Set(request.name.trim().to_string()),
            description: Set(request.description.clone()),
            price: Set(request.price),
            stock: Set(request.stock),
            barcode: Set(normalize(request.barcode.clone())),
            brand: Set(request.brand.clone()),
            model: Set(request.model.clone()),
            movement: Set(request.movement.clone()),
            case_material: Set(request.case_material.clone()),
            strap_material: Set(request.strap_material.clone()),
            dial_color: Set(request.dial_color.clone()),
            water_resistance: Set(request.water_resistance.clone()),
            category_id: Set(request.category_id),
            visible: Set(request.visible.unwrap_or(true)),
            average_rating: Set(Decimal::ZERO),
            review_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if let Some(urls) = request.image_urls.as_deref() {
            replace_images(&txn, model.id, urls, request.primary_image_url.as_deref()).await?;
        }
        let dto = build_dto(&txn, model).await?;
        txn.commit().await?;

        info!(product_id = dto.id, "Product created");
        Ok(dto)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: i32, request: ProductRequest) -> Result<ProductDto, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let existing = product::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;
        ensure_category_exists(&txn, request.category_id).await?;
        ensure_barcode_free(&txn, request.barcode.as_deref(), Some(id)).await?;

        let mut active = existing.into_active_model();
        active.name = Set(request.name.trim().to_string());
        active.description = Set(request.description.clone());
        active.price = Set(request.price);
        active.stock = Set(request.stock);
        active.barcode = Set(normalize(request.barcode.clone()));
        active.brand = Set(request.brand.clone());
        active.model = Set(request.model.clone());
        active.movement = Set(request.movement.clone());
        active.case_material = Set(request.case_material.clone());
        active.strap_material = Set(request.strap_material.clone());
        active.dial_color = Set(request.dial_color.clone());
        active.water_resistance = Set(request.water_resistance.clone());
        active.category_id = Set(request.category_id);
        if let Some(visible) = request.visible {
            active.visible = Set(visible);
        }
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;

        if let Some(urls) = request.image_urls.as_deref() {
            replace_images(&txn, id, urls, request.primary_image_url.as_deref()).await?;
        }
        let dto = build_dto(&txn, model).await?;
        txn.commit().await?;

        info!(product_id = id, "Product updated");
        Ok(dto)
    }

    #[instrument(skip(self))]
    pub async fn toggle_visibility(&self, id: i32) -> Result<ProductDto, ServiceError> {
        let existing = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;
        let visible = !existing.visible;
        self.set_visible(existing, visible).await
    }

    /// Soft delete: the product disappears from the storefront but keeps its history.
    #[instrument(skip(self))]
    pub async fn hide(&self, id: i32) -> Result<ProductDto, ServiceError> {
        let existing = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;
        self.set_visible(existing, false).await
    }

    async fn set_visible(
        &self,
        existing: product::Model,
        visible: bool,
    ) -> Result<ProductDto, ServiceError> {
        let id = existing.id;
        let mut active = existing.into_active_model();
        active.visible = Set(visible);
        active.updated_at = Set(Utc::now());
        let model = active.update(&*self.db).await?;

        info!(product_id = id, visible, "Product visibility changed");
        build_dto(&*self.db, model).await
    }

    /// First product (by id) whose name contains `fragment`, case-insensitively.
    #[instrument(skip(self))]
    pub async fn find_first_by_name(
        &self,
        fragment: &str,
    ) -> Result<Option<ProductDto>, ServiceError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }

        let found = product::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col((
                    product::Entity,
                    product::Column::Name,
                ))))
                .like(contains_pattern(fragment)),
            )
            .order_by_asc(product::Column::Id)
            .one(&*self.db)
            .await?;

        match found {
            Some(model) => Ok(Some(build_dto(&*self.db, model).await?)),
            None => Ok(None),
        }
    }

    /// Newest visible products.
    pub async fn newest_visible(&self, limit: u64) -> Result<Vec<ProductDto>, ServiceError> {
        let models = product::Entity::find()
            .filter(product::Column::Visible.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .order_by_desc(product::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?;
        build_dtos(&*self.db, models).await
    }
}

/// Stock levels, lowest first.
pub async fn inventory_summary<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<InventoryEntry>, ServiceError> {
    let rows = product::Entity::find()
        .order_by_asc(product::Column::Stock)
        .order_by_asc(product::Column::Name)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|p| InventoryEntry {
            product_id: p.id,
            name: p.name,
            stock: p.stock,
        })
        .collect())
}

/// Reserves stock with a single conditional update.
///
/// Fails with `OperationFailed` when fewer than `quantity` units remain, which
/// also covers losing a race against a concurrent order.
pub async fn decrease_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(product_id, quantity, "Stock reservation rejected");
        return Err(ServiceError::OperationFailed(format!(
            "Insufficient stock for product {}",
            product_id
        )));
    }
    Ok(())
}

/// Returns reserved units to stock.
pub async fn increase_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::not_found("Product", product_id));
    }
    Ok(())
}

/// Images grouped by product id, each list in display order.
pub async fn load_images<C: ConnectionTrait>(
    conn: &C,
    product_ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, Vec<product_image::Model>>, ServiceError> {
    let ids: BTreeSet<i32> = product_ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = product_image::Entity::find()
        .filter(product_image::Column::ProductId.is_in(ids))
        .order_by_asc(product_image::Column::DisplayOrder)
        .order_by_asc(product_image::Column::Id)
        .all(conn)
        .await?;

    let mut grouped: HashMap<i32, Vec<product_image::Model>> = HashMap::new();
    for image in rows {
        grouped.entry(image.product_id).or_default().push(image);
    }
    Ok(grouped)
}

/// The image flagged primary, else the first in display order.
pub fn primary_image(images: &[product_image::Model]) -> Option<&product_image::Model> {
    images
        .iter()
        .find(|img| img.is_primary)
        .or_else(|| images.first())
}

pub async fn build_dto<C: ConnectionTrait>(
    conn: &C,
    model: product::Model,
) -> Result<ProductDto, ServiceError> {
    let mut dtos = build_dtos(conn, vec![model]).await?;
    dtos.pop()
        .ok_or_else(|| ServiceError::InternalError("product mapping produced no row".into()))
}

/// Maps products to DTOs, batch-loading categories and images.
pub async fn build_dtos<C: ConnectionTrait>(
    conn: &C,
    models: Vec<product::Model>,
) -> Result<Vec<ProductDto>, ServiceError> {
    if models.is_empty() {
        return Ok(Vec::new());
    }

    let category_ids: BTreeSet<i32> = models.iter().map(|p| p.category_id).collect();
    let categories: HashMap<i32, String> = category::Entity::find()
        .filter(category::Column::Id.is_in(category_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let mut images = load_images(conn, models.iter().map(|p| p.id)).await?;

    Ok(models
        .into_iter()
        .map(|p| {
            let product_images = images.remove(&p.id).unwrap_or_default();
            let primary_image_url = primary_image(&product_images).map(|i| i.image_url.clone());
            ProductDto {
                category_name: categories.get(&p.category_id).cloned(),
                primary_image_url,
                image_urls: product_images.into_iter().map(|i| i.image_url).collect(),
                id: p.id,
                name: p.name,
                description: p.description,
                price: p.price,
                stock: p.stock,
                barcode: p.barcode,
                brand: p.brand,
                model: p.model,
                movement: p.movement,
                case_material: p.case_material,
                strap_material: p.strap_material,
                dial_color: p.dial_color,
                water_resistance: p.water_resistance,
                category_id: p.category_id,
                visible: p.visible,
                average_rating: p.average_rating,
                review_count: p.review_count,
                created_at: p.created_at,
                updated_at: p.updated_at,
            }
        })
        .collect())
}

async fn ensure_category_exists<C: ConnectionTrait>(
    conn: &C,
    category_id: i32,
) -> Result<(), ServiceError> {
    category::Entity::find_by_id(category_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Category", category_id))?;
    Ok(())
}

async fn ensure_barcode_free<C: ConnectionTrait>(
    conn: &C,
    barcode: Option<&str>,
    except_id: Option<i32>,
) -> Result<(), ServiceError> {
    let Some(barcode) = barcode.map(str::trim).filter(|b| !b.is_empty()) else {
        return Ok(());
    };

    let mut query = product::Entity::find().filter(product::Column::Barcode.eq(barcode));
    if let Some(id) = except_id {
        query = query.filter(product::Column::Id.ne(id));
    }
    if query.count(conn).await? > 0 {
        return Err(ServiceError::Conflict(format!(
            "Barcode '{}' is already used by another product",
            barcode
        )));
    }
    Ok(())
}

/// Replaces the image set; `display_order` follows the given order.
async fn replace_images<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    urls: &[String],
    primary_url: Option<&str>,
) -> Result<(), ServiceError> {
    product_image::Entity::delete_many()
        .filter(product_image::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;

    let urls: Vec<&str> = urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();
    let primary_url = primary_url
        .map(str::trim)
        .filter(|p| urls.contains(p))
        .or_else(|| urls.first().copied());

    for (index, url) in urls.iter().enumerate() {
        product_image::ActiveModel {
            product_id: Set(product_id),
            image_url: Set(url.to_string()),
            is_primary: Set(Some(*url) == primary_url),
            display_order: Set(index as i32),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
