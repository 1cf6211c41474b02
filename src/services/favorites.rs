use crate::{
    entities::{favorite, product},
    errors::ServiceError,
    services::products::{build_dto, build_dtos, ProductDto},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteDto {
    pub id: i32,
    pub user_id: i32,
    pub product: ProductDto,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FavoriteService {
    db: Arc<DatabaseConnection>,
}

impl FavoriteService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Marks a product as favorite; adding it twice returns the first record.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: i32, product_id: i32) -> Result<FavoriteDto, ServiceError> {
        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let existing = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(user_id))
            .filter(favorite::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;
        let record = match existing {
            Some(record) => record,
            None => {
                let record = favorite::ActiveModel {
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
                info!(user_id, product_id, "Favorite added");
                record
            }
        };

        Ok(FavoriteDto {
            id: record.id,
            user_id: record.user_id,
            product: build_dto(&*self.db, product).await?,
            created_at: record.created_at,
        })
    }

    /// The user's favorites, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: i32) -> Result<Vec<FavoriteDto>, ServiceError> {
        let records = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(user_id))
            .order_by_desc(favorite::Column::CreatedAt)
            .order_by_desc(favorite::Column::Id)
            .all(&*self.db)
            .await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(records.iter().map(|f| f.product_id)))
            .all(&*self.db)
            .await?;
        let mut products: HashMap<i32, ProductDto> = build_dtos(&*self.db, products)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(records
            .into_iter()
            .filter_map(|f| {
                let product = products.remove(&f.product_id)?;
                Some(FavoriteDto {
                    id: f.id,
                    user_id: f.user_id,
                    product,
                    created_at: f.created_at,
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: i32, favorite_id: i32) -> Result<(), ServiceError> {
        let record = favorite::Entity::find_by_id(favorite_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Favorite", favorite_id))?;
        if record.user_id != user_id {
            return Err(ServiceError::BadRequest(
                "Favorite record does not belong to the specified user.".to_string(),
            ));
        }

        favorite::Entity::delete_by_id(record.id)
            .exec(&*self.db)
            .await?;
        info!(user_id, favorite_id, "Favorite removed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_by_product(&self, user_id: i32, product_id: i32) -> Result<(), ServiceError> {
        let result = favorite::Entity::delete_many()
            .filter(favorite::Column::UserId.eq(user_id))
            .filter(favorite::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in the favorites of user {}",
                product_id, user_id
            )));
        }

        info!(user_id, product_id, "Favorite removed");
        Ok(())
    }
}
