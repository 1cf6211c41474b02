use crate::{
    entities::{product, product_review, user},
    errors::ServiceError,
    services::orders::completed_order_ids_containing,
    PaginatedResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Select, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewDto {
    pub id: i32,
    pub product_id: i32,
    pub user_id: i32,
    pub reviewer_name: Option<String>,
    pub order_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
    pub is_visible: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ReviewRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
    /// Only checked on update: must match the reviewed order.
    pub order_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReviewVisibilityRequest {
    pub visible: bool,
}

/// Product reviews by buyers with a completed purchase.
#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Reviews the product against the oldest completed order that the user
    /// has not reviewed it for yet.
    #[instrument(skip(self, request), fields(product_id = request.product_id))]
    pub async fn add_review(
        &self,
        user_id: i32,
        request: ReviewRequest,
    ) -> Result<ReviewDto, ServiceError> {
        request.validate()?;
        let product_id = request.product_id;

        let txn = self.db.begin().await?;
        ensure_product(&txn, product_id).await?;

        let eligible = completed_order_ids_containing(&txn, user_id, product_id).await?;
        if eligible.is_empty() {
            return Err(ServiceError::BadRequest(
                "You must purchase and complete an order containing this product before reviewing it."
                    .to_string(),
            ));
        }

        let reviewed: BTreeSet<i32> = product_review::Entity::find()
            .filter(product_review::Column::UserId.eq(user_id))
            .filter(product_review::Column::ProductId.eq(product_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.order_id)
            .collect();
        let order_id = eligible
            .into_iter()
            .find(|id| !reviewed.contains(id))
            .ok_or_else(|| {
                ServiceError::BadRequest(
                    "You have already reviewed this product for all eligible orders.".to_string(),
                )
            })?;

        let model = product_review::ActiveModel {
            product_id: Set(product_id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            rating: Set(request.rating),
            comment: Set(request.comment),
            review_date: Set(Utc::now()),
            is_visible: Set(true),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        recompute_product_rating(&txn, product_id).await?;
        let dto = to_dtos(&txn, vec![model]).await?.pop();
        txn.commit().await?;

        info!(user_id, product_id, order_id, "Review added");
        dto.ok_or_else(|| ServiceError::InternalError("review mapping produced no row".into()))
    }

    /// Visible reviews of a product, newest first.
    #[instrument(skip(self))]
    pub async fn list_visible(
        &self,
        product_id: i32,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ReviewDto>, ServiceError> {
        ensure_product(&*self.db, product_id).await?;
        let query = product_review::Entity::find()
            .filter(product_review::Column::ProductId.eq(product_id))
            .filter(product_review::Column::IsVisible.eq(true));
        self.paginate(query, page, limit).await
    }

    /// Every review of a product, hidden ones included.
    #[instrument(skip(self))]
    pub async fn list_for_product(
        &self,
        product_id: i32,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ReviewDto>, ServiceError> {
        ensure_product(&*self.db, product_id).await?;
        let query = product_review::Entity::find()
            .filter(product_review::Column::ProductId.eq(product_id));
        self.paginate(query, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ReviewDto>, ServiceError> {
        self.paginate(product_review::Entity::find(), page, limit)
            .await
    }

    async fn paginate(
        &self,
        query: Select<product_review::Entity>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ReviewDto>, ServiceError> {
        let paginator = query
            .order_by_desc(product_review::Column::ReviewDate)
            .order_by_desc(product_review::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        let items = to_dtos(&*self.db, rows).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    #[instrument(skip(self, request))]
    pub async fn update_own(
        &self,
        review_id: i32,
        user_id: i32,
        request: ReviewRequest,
    ) -> Result<ReviewDto, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let review = find_review(&txn, review_id).await?;
        if review.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "You can only modify your own reviews".to_string(),
            ));
        }
        if review.product_id != request.product_id {
            return Err(ServiceError::BadRequest(
                "A review cannot be moved to another product".to_string(),
            ));
        }
        if request.order_id.is_some_and(|o| o != review.order_id) {
            return Err(ServiceError::BadRequest(
                "A review cannot be moved to another order".to_string(),
            ));
        }

        let product_id = review.product_id;
        let mut active = review.into_active_model();
        active.rating = Set(request.rating);
        active.comment = Set(request.comment);
        let model = active.update(&txn).await?;
        recompute_product_rating(&txn, product_id).await?;
        let dto = to_dtos(&txn, vec![model]).await?.pop();
        txn.commit().await?;

        info!(review_id, user_id, "Review updated");
        dto.ok_or_else(|| ServiceError::InternalError("review mapping produced no row".into()))
    }

    #[instrument(skip(self))]
    pub async fn delete_own(&self, review_id: i32, user_id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let review = find_review(&txn, review_id).await?;
        if review.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "You can only delete your own reviews".to_string(),
            ));
        }
        remove(&txn, review).await?;
        txn.commit().await?;

        info!(review_id, user_id, "Review deleted by author");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, review_id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let review = find_review(&txn, review_id).await?;
        remove(&txn, review).await?;
        txn.commit().await?;

        info!(review_id, "Review deleted by admin");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_visibility(
        &self,
        review_id: i32,
        visible: bool,
    ) -> Result<ReviewDto, ServiceError> {
        let txn = self.db.begin().await?;
        let review = find_review(&txn, review_id).await?;
        let product_id = review.product_id;

        let mut active = review.into_active_model();
        active.is_visible = Set(visible);
        let model = active.update(&txn).await?;
        recompute_product_rating(&txn, product_id).await?;
        let dto = to_dtos(&txn, vec![model]).await?.pop();
        txn.commit().await?;

        info!(review_id, visible, "Review visibility changed");
        dto.ok_or_else(|| ServiceError::InternalError("review mapping produced no row".into()))
    }
}

/// Refreshes the product's cached rating from its visible reviews:
/// mean rounded half-up to two decimals (zero when there are none) and count.
pub async fn recompute_product_rating<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
) -> Result<(), ServiceError> {
    let ratings: Vec<i32> = product_review::Entity::find()
        .filter(product_review::Column::ProductId.eq(product_id))
        .filter(product_review::Column::IsVisible.eq(true))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();

    let average = average_rating(&ratings);
    product::Entity::update_many()
        .col_expr(product::Column::AverageRating, Expr::value(average))
        .col_expr(product::Column::ReviewCount, Expr::value(ratings.len() as i32))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

fn average_rating(ratings: &[i32]) -> Decimal {
    if ratings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    (Decimal::from(sum) / Decimal::from(ratings.len() as i64))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

async fn ensure_product<C: ConnectionTrait>(conn: &C, product_id: i32) -> Result<(), ServiceError> {
    product::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
    Ok(())
}

async fn find_review<C: ConnectionTrait>(
    conn: &C,
    review_id: i32,
) -> Result<product_review::Model, ServiceError> {
    product_review::Entity::find_by_id(review_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Review", review_id))
}

async fn remove<C: ConnectionTrait>(
    conn: &C,
    review: product_review::Model,
) -> Result<(), ServiceError> {
    let product_id = review.product_id;
    product_review::Entity::delete_by_id(review.id)
        .exec(conn)
        .await?;
    recompute_product_rating(conn, product_id).await
}

async fn to_dtos<C: ConnectionTrait>(
    conn: &C,
    reviews: Vec<product_review::Model>,
) -> Result<Vec<ReviewDto>, ServiceError> {
    let user_ids: BTreeSet<i32> = reviews.iter().map(|r| r.user_id).collect();
    let names: HashMap<i32, String> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|u| {
                let name = u.full_name();
                (u.id, if name.is_empty() { u.username } else { name })
            })
            .collect()
    };

    Ok(reviews
        .into_iter()
        .map(|r| ReviewDto {
            reviewer_name: names.get(&r.user_id).cloned(),
            id: r.id,
            product_id: r.product_id,
            user_id: r.user_id,
            order_id: r.order_id,
            rating: r.rating,
            comment: r.comment,
            review_date: r.review_date,
            is_visible: r.is_visible,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn average_rounds_half_up_to_two_places() {
        assert_eq!(average_rating(&[]), Decimal::ZERO);
        assert_eq!(average_rating(&[5]), dec!(5));
        assert_eq!(average_rating(&[4, 5]), dec!(4.5));
        // 13 / 3 = 4.333..
        assert_eq!(average_rating(&[4, 4, 5]), dec!(4.33));
        // 14 / 3 = 4.666..
        assert_eq!(average_rating(&[4, 5, 5]), dec!(4.67));
        // 9 / 8 = 1.125
        assert_eq!(average_rating(&[1, 1, 1, 1, 1, 1, 1, 2]), dec!(1.13));
    }

    #[test]
    fn rating_must_be_between_one_and_five() {
        let mut request = ReviewRequest {
            product_id: 1,
            rating: 5,
            comment: Some("Đồng hồ rất đẹp".into()),
            order_id: None,
        };
        assert!(request.validate().is_ok());
        request.rating = 0;
        assert!(request.validate().is_err());
        request.rating = 6;
        assert!(request.validate().is_err());
    }
}
