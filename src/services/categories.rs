use crate::{
    entities::{category, product},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryDto {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<category::Model> for CategoryDto {
    fn from(model: category::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            visible: model.visible,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub visible: Option<bool>,
}

#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_visible(&self) -> Result<Vec<CategoryDto>, ServiceError> {
        let rows = category::Entity::find()
            .filter(category::Column::Visible.eq(true))
            .order_by_desc(category::Column::CreatedAt)
            .order_by_desc(category::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<CategoryDto>, ServiceError> {
        let rows = category::Entity::find()
            .order_by_desc(category::Column::CreatedAt)
            .order_by_desc(category::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32, visible_only: bool) -> Result<CategoryDto, ServiceError> {
        category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|c| !visible_only || c.visible)
            .map(Into::into)
            .ok_or_else(|| ServiceError::not_found("Category", id))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CategoryRequest) -> Result<CategoryDto, ServiceError> {
        request.validate()?;
        let name = required_name(&request.name)?;

        let now = Utc::now();
        let model = category::ActiveModel {
            name: Set(name),
            description: Set(request.description),
            visible: Set(request.visible.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(category_id = model.id, "Category created");
        Ok(model.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i32,
        request: CategoryRequest,
    ) -> Result<CategoryDto, ServiceError> {
        request.validate()?;
        let name = required_name(&request.name)?;

        let existing = category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", id))?;

        let mut active = existing.into_active_model();
        active.name = Set(name);
        active.description = Set(request.description);
        if let Some(visible) = request.visible {
            active.visible = Set(visible);
        }
        active.updated_at = Set(Utc::now());
        let model = active.update(&*self.db).await?;

        info!(category_id = id, "Category updated");
        Ok(model.into())
    }

    #[instrument(skip(self))]
    pub async fn toggle_visibility(&self, id: i32) -> Result<CategoryDto, ServiceError> {
        let existing = category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", id))?;

        let visible = !existing.visible;
        let mut active = existing.into_active_model();
        active.visible = Set(visible);
        active.updated_at = Set(Utc::now());
        let model = active.update(&*self.db).await?;

        info!(category_id = id, visible, "Category visibility changed");
        Ok(model.into())
    }

    /// Deletes an empty category.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let existing = category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", id))?;

        let products = product::Entity::find()
            .filter(product::Column::CategoryId.eq(id))
            .count(&*self.db)
            .await?;
        if products > 0 {
            return Err(ServiceError::Conflict(
                "Category still has products".to_string(),
            ));
        }

        category::Entity::delete_by_id(existing.id)
            .exec(&*self.db)
            .await?;
        info!(category_id = id, "Category deleted");
        Ok(())
    }
}

fn required_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(
            "Category name must not be blank".to_string(),
        ));
    }
    Ok(name.to_string())
}
