//! Admin dashboard figures.
//!
//! Aggregation runs in memory over the matching rows so the same code works
//! on PostgreSQL and SQLite without dialect-specific date or decimal SQL.

use crate::{
    entities::{category, order, order_item, product, user, OrderStatus, Role},
    errors::ServiceError,
    services::products::{inventory_summary, InventoryEntry},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::instrument;
use utoipa::ToSchema;

const DEFAULT_CUSTOMER_LIMIT: i64 = 10;
const DEFAULT_TOP_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub completed_orders: u64,
    pub total_customers: u64,
    pub total_products: u64,
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    #[schema(value_type = String)]
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyOrderCount {
    pub date: NaiveDate,
    pub order_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryRevenue {
    pub category_name: String,
    #[schema(value_type = String)]
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerRevenue {
    pub user_id: i32,
    pub full_name: String,
    #[schema(value_type = String)]
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductSales {
    pub product_id: i32,
    pub product_name: String,
    pub quantity_sold: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerOrderCount {
    pub user_id: i32,
    pub full_name: String,
    pub order_count: u64,
}

/// `from`/`to` as `YYYY-MM-DD`, both inclusive
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct DateRangeQuery {
    pub from: String,
    pub to: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// Parses an inclusive date range into `[from 00:00:00, to 23:59:59.999999]`.
pub fn parse_date_range(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let parse = |value: &str| {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
            ServiceError::BadRequest(format!(
                "Invalid date format '{}'. Expected YYYY-MM-DD",
                value
            ))
        })
    };
    let from_date = parse(from)?;
    let to_date = parse(to)?;
    if from_date > to_date {
        return Err(ServiceError::BadRequest(
            "Start date must not be after end date".to_string(),
        ));
    }

    let start = from_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ServiceError::BadRequest(format!("Invalid date '{}'", from)))?
        .and_utc();
    let end = to_date
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| ServiceError::BadRequest(format!("Invalid date '{}'", to)))?
        .and_utc();
    Ok((start, end))
}

fn effective_limit(requested: Option<i64>, default: i64) -> usize {
    match requested {
        Some(n) if n > 0 => n as usize,
        _ => default as usize,
    }
}

#[derive(Clone)]
pub struct StatisticsService {
    db: Arc<DatabaseConnection>,
}

impl StatisticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, ServiceError> {
        let db = &*self.db;
        let total_orders = order::Entity::find().count(db).await?;
        let pending_orders = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .count(db)
            .await?;
        let completed_orders = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .count(db)
            .await?;
        let total_customers = user::Entity::find()
            .filter(user::Column::Role.eq(Role::Buyer))
            .count(db)
            .await?;
        let total_products = product::Entity::find().count(db).await?;
        let total_revenue = order::Entity::find()
            .filter(order::Column::Status.is_in(OrderStatus::revenue_statuses()))
            .all(db)
            .await?
            .iter()
            .map(|o| o.total_amount)
            .sum();

        Ok(DashboardSummary {
            total_orders,
            pending_orders,
            completed_orders,
            total_customers,
            total_products,
            total_revenue,
        })
    }

    #[instrument(skip(self))]
    pub async fn daily_revenue(&self, from: &str, to: &str) -> Result<Vec<DailyRevenue>, ServiceError> {
        let orders = self.revenue_orders_between(from, to).await?;
        let mut by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for o in orders {
            *by_day.entry(o.created_at.date_naive()).or_default() += o.total_amount;
        }
        Ok(by_day
            .into_iter()
            .map(|(date, revenue)| DailyRevenue { date, revenue })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn daily_order_counts(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<DailyOrderCount>, ServiceError> {
        let orders = self.revenue_orders_between(from, to).await?;
        let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for o in orders {
            *by_day.entry(o.created_at.date_naive()).or_default() += 1;
        }
        Ok(by_day
            .into_iter()
            .map(|(date, order_count)| DailyOrderCount { date, order_count })
            .collect())
    }

    /// Line revenue (price × quantity) per category, highest first.
    #[instrument(skip(self))]
    pub async fn revenue_by_category(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<CategoryRevenue>, ServiceError> {
        let orders = self.revenue_orders_between(from, to).await?;
        let lines = self.lines_of(&orders).await?;
        let products = self.products_of(&lines).await?;

        let category_ids: BTreeSet<i32> = products.values().map(|p| p.category_id).collect();
        let categories: HashMap<i32, String> = category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut totals: HashMap<String, Decimal> = HashMap::new();
        for line in &lines {
            let name = products
                .get(&line.product_id)
                .and_then(|p| categories.get(&p.category_id))
                .cloned()
                .unwrap_or_else(|| "Uncategorized".to_string());
            *totals.entry(name).or_default() += line.price * Decimal::from(line.quantity);
        }

        let mut rows: Vec<CategoryRevenue> = totals
            .into_iter()
            .map(|(category_name, revenue)| CategoryRevenue {
                category_name,
                revenue,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| a.category_name.cmp(&b.category_name))
        });
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn revenue_by_customer(
        &self,
        from: &str,
        to: &str,
        limit: Option<i64>,
    ) -> Result<Vec<CustomerRevenue>, ServiceError> {
        let limit = effective_limit(limit, DEFAULT_CUSTOMER_LIMIT);
        let orders = self.revenue_orders_between(from, to).await?;

        let mut totals: HashMap<i32, Decimal> = HashMap::new();
        for o in &orders {
            *totals.entry(o.user_id).or_default() += o.total_amount;
        }
        let names = self.names_of(totals.keys().copied()).await?;

        let mut rows: Vec<CustomerRevenue> = totals
            .into_iter()
            .map(|(user_id, revenue)| CustomerRevenue {
                user_id,
                full_name: names.get(&user_id).cloned().unwrap_or_default(),
                revenue,
            })
            .collect();
        rows.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.user_id.cmp(&b.user_id)));
        rows.truncate(limit);
        Ok(rows)
    }

    /// Units sold across paid and completed orders, best sellers first.
    #[instrument(skip(self))]
    pub async fn top_selling_products(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<ProductSales>, ServiceError> {
        let limit = effective_limit(limit, DEFAULT_TOP_LIMIT);
        let orders = order::Entity::find()
            .filter(order::Column::Status.is_in(OrderStatus::revenue_statuses()))
            .all(&*self.db)
            .await?;
        let lines = self.lines_of(&orders).await?;
        let products = self.products_of(&lines).await?;

        let mut sold: HashMap<i32, i64> = HashMap::new();
        for line in &lines {
            *sold.entry(line.product_id).or_default() += i64::from(line.quantity);
        }

        let mut rows: Vec<ProductSales> = sold
            .into_iter()
            .map(|(product_id, quantity_sold)| ProductSales {
                product_id,
                product_name: products
                    .get(&product_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                quantity_sold,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.quantity_sold
                .cmp(&a.quantity_sold)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    pub async fn top_customers_by_completed_orders(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<CustomerOrderCount>, ServiceError> {
        self.top_customers_by_status(OrderStatus::Completed, limit)
            .await
    }

    pub async fn top_customers_by_canceled_orders(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<CustomerOrderCount>, ServiceError> {
        self.top_customers_by_status(OrderStatus::Canceled, limit)
            .await
    }

    #[instrument(skip(self))]
    async fn top_customers_by_status(
        &self,
        status: OrderStatus,
        limit: Option<i64>,
    ) -> Result<Vec<CustomerOrderCount>, ServiceError> {
        let limit = effective_limit(limit, DEFAULT_TOP_LIMIT);
        let orders = order::Entity::find()
            .filter(order::Column::Status.eq(status))
            .all(&*self.db)
            .await?;

        let mut counts: HashMap<i32, u64> = HashMap::new();
        for o in &orders {
            *counts.entry(o.user_id).or_default() += 1;
        }
        let names = self.names_of(counts.keys().copied()).await?;

        let mut rows: Vec<CustomerOrderCount> = counts
            .into_iter()
            .map(|(user_id, order_count)| CustomerOrderCount {
                user_id,
                full_name: names.get(&user_id).cloned().unwrap_or_default(),
                order_count,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.order_count
                .cmp(&a.order_count)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Stock per product, lowest first.
    #[instrument(skip(self))]
    pub async fn inventory(&self) -> Result<Vec<InventoryEntry>, ServiceError> {
        inventory_summary(&*self.db).await
    }

    async fn revenue_orders_between(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let (start, end) = parse_date_range(from, to)?;
        Ok(order::Entity::find()
            .filter(order::Column::Status.is_in(OrderStatus::revenue_statuses()))
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lte(end))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn lines_of(&self, orders: &[order::Model]) -> Result<Vec<order_item::Model>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(orders.iter().map(|o| o.id)))
            .all(&*self.db)
            .await?)
    }

    async fn products_of(
        &self,
        lines: &[order_item::Model],
    ) -> Result<HashMap<i32, product::Model>, ServiceError> {
        let ids: BTreeSet<i32> = lines.iter().map(|l| l.product_id).collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    async fn names_of(
        &self,
        user_ids: impl Iterator<Item = i32>,
    ) -> Result<HashMap<i32, String>, ServiceError> {
        let ids: BTreeSet<i32> = user_ids.collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.full_name()))
            .collect())
    }
}
