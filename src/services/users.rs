use crate::{
    auth::{hash_password, verify_password},
    config::AdminBootstrapConfig,
    entities::{cart, cart_item, favorite, order, product_review, user, AuthProvider, Role},
    errors::ServiceError,
    services::{contains_pattern, reviews::recompute_product_rating},
    PaginatedResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Account data safe to return to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub role: Role,
    pub provider: AuthProvider,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserDto {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            phone: model.phone,
            address: model.address,
            date_of_birth: model.date_of_birth,
            role: model.role,
            provider: model.provider,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    #[validate(email, length(max = 100))]
    pub email: String,
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 15))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserDto,
}

/// Fields a user may change on their own profile
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct ProfileUpdate {
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 15))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AdminCreateUser {
    #[validate]
    #[serde(flatten)]
    pub user: RegisterUser,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct AdminUpdateUser {
    pub role: Option<Role>,
    #[validate]
    #[serde(flatten)]
    pub profile: ProfileUpdate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Registers a local BUYER account.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegisterUser) -> Result<UserDto, ServiceError> {
        self.create_local_user(request, Role::Buyer).await
    }

    async fn create_local_user(
        &self,
        request: RegisterUser,
        role: Role,
    ) -> Result<UserDto, ServiceError> {
        request.validate()?;
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_string();

        if find_by_username(&*self.db, &username).await?.is_some() {
            return Err(ServiceError::BadRequest("Username already exists".to_string()));
        }
        if find_by_email(&*self.db, &email).await?.is_some() {
            return Err(ServiceError::BadRequest("Email already exists".to_string()));
        }

        let password_hash = hash_password(&request.password)?;
        let model = user::ActiveModel {
            username: Set(username),
            password_hash: Set(password_hash),
            email: Set(email),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            phone: Set(request.phone),
            address: Set(request.address),
            date_of_birth: Set(request.date_of_birth),
            role: Set(role),
            provider: Set(AuthProvider::Local),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(user_id = model.id, role = %role, "User registered");
        Ok(model.into())
    }

    /// Checks credentials; unknown user and wrong password look the same.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid username or password".to_string());

        let user = find_by_username(&*self.db, username.trim())
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash) {
            warn!(user_id = user.id, "Login rejected");
            return Err(invalid());
        }

        info!(user_id = user.id, "User authenticated");
        Ok(user)
    }

    pub async fn get_profile(&self, user_id: i32) -> Result<UserDto, ServiceError> {
        Ok(self.find(user_id).await?.into())
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: i32,
        update: ProfileUpdate,
    ) -> Result<UserDto, ServiceError> {
        update.validate()?;
        let existing = self.find(user_id).await?;

        let mut active = existing.into_active_model();
        apply_profile(&mut active, update);
        let model = active.update(&*self.db).await?;

        info!(user_id, "Profile updated");
        Ok(model.into())
    }

    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: i32,
        request: ChangePasswordRequest,
    ) -> Result<(), ServiceError> {
        request.validate()?;
        let existing = self.find(user_id).await?;

        if !verify_password(&request.current_password, &existing.password_hash) {
            return Err(ServiceError::BadRequest(
                "Incorrect current password.".to_string(),
            ));
        }
        if request.new_password == request.current_password {
            return Err(ServiceError::BadRequest(
                "New password must be different from the current password.".to_string(),
            ));
        }

        let mut active = existing.into_active_model();
        active.password_hash = Set(hash_password(&request.new_password)?);
        active.update(&*self.db).await?;

        info!(user_id, "Password changed");
        Ok(())
    }

    /// Sets a new password for the account with this email.
    #[instrument(skip(self, new_password))]
    pub async fn update_password_by_email(
        &self,
        email: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        if new_password.len() < 6 {
            return Err(ServiceError::ValidationError(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        let existing = find_by_email(&*self.db, email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No user with email {}", email)))?;

        let user_id = existing.id;
        let mut active = existing.into_active_model();
        active.password_hash = Set(hash_password(new_password)?);
        active.update(&*self.db).await?;

        info!(user_id, "Password reset");
        Ok(())
    }

    pub async fn exists_by_email(&self, email: &str) -> Result<bool, ServiceError> {
        Ok(find_by_email(&*self.db, email).await?.is_some())
    }

    /// Creates or refreshes the account behind a social login.
    ///
    /// An email registered through a different provider is refused. New
    /// accounts get a username derived from the email's local part and a
    /// random password hash nobody knows.
    #[instrument(skip(self))]
    pub async fn upsert_oauth_user(
        &self,
        provider: AuthProvider,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<user::Model, ServiceError> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ServiceError::BadRequest(format!("Email not returned by {} login", provider))
            })?;
        let (first_name, last_name) = split_name(name);

        if let Some(existing) = find_by_email(&*self.db, email).await? {
            if existing.provider != provider {
                return Err(ServiceError::BadRequest(format!(
                    "This email is already registered with {}. Please sign in with {}.",
                    existing.provider, existing.provider
                )));
            }
            let mut active = existing.into_active_model();
            if first_name.is_some() {
                active.first_name = Set(first_name);
                active.last_name = Set(last_name);
            }
            let model = active.update(&*self.db).await?;
            info!(user_id = model.id, provider = %provider, "OAuth user refreshed");
            return Ok(model);
        }

        let base = email
            .split('@')
            .next()
            .filter(|local| !local.is_empty())
            .unwrap_or("user")
            .to_string();
        let mut username = base.clone();
        let mut counter = 1;
        while find_by_username(&*self.db, &username).await?.is_some() {
            username = format!("{}{}", base, counter);
            counter += 1;
        }

        let random_secret: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let model = user::ActiveModel {
            first_name: Set(first_name.or_else(|| Some("User".to_string()))),
            last_name: Set(last_name.or_else(|| Some(username.clone()))),
            username: Set(username),
            password_hash: Set(hash_password(&random_secret)?),
            email: Set(email.to_string()),
            role: Set(Role::Buyer),
            provider: Set(provider),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(user_id = model.id, provider = %provider, "OAuth user provisioned");
        Ok(model)
    }

    /// Admin listing with optional role filter and name/email search.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        filter: UserListFilter,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<UserDto>, ServiceError> {
        let column = match filter.sort_by.as_deref().unwrap_or("id") {
            "id" => user::Column::Id,
            "username" => user::Column::Username,
            "email" => user::Column::Email,
            "created_at" | "createdAt" => user::Column::CreatedAt,
            other => {
                return Err(ServiceError::BadRequest(format!(
                    "Unsupported sort field '{}'",
                    other
                )))
            }
        };
        let direction = match filter.sort_dir.as_deref() {
            Some(d) if d.eq_ignore_ascii_case("desc") => sea_orm::Order::Desc,
            _ => sea_orm::Order::Asc,
        };

        let mut query = user::Entity::find();
        if let Some(role) = filter.role {
            query = query.filter(user::Column::Role.eq(role));
        }
        if let Some(term) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let lower = |col: user::Column| {
                Expr::expr(Func::lower(Expr::col((user::Entity, col)))).like(contains_pattern(term))
            };
            query = query.filter(
                Condition::any()
                    .add(lower(user::Column::FirstName))
                    .add(lower(user::Column::LastName))
                    .add(lower(user::Column::Email)),
            );
        }

        let paginator = query.order_by(column, direction).paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse::new(
            users.into_iter().map(Into::into).collect(),
            total,
            page,
            limit,
        ))
    }

    pub async fn get_user(&self, user_id: i32) -> Result<UserDto, ServiceError> {
        Ok(self.find(user_id).await?.into())
    }

    #[instrument(skip(self, request))]
    pub async fn create_user(&self, request: AdminCreateUser) -> Result<UserDto, ServiceError> {
        let role = request.role.unwrap_or(Role::Buyer);
        self.create_local_user(request.user, role).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        user_id: i32,
        request: AdminUpdateUser,
    ) -> Result<UserDto, ServiceError> {
        request.validate()?;
        let existing = self.find(user_id).await?;

        let mut active = existing.into_active_model();
        if let Some(role) = request.role {
            active.role = Set(role);
        }
        apply_profile(&mut active, request.profile);
        let model = active.update(&*self.db).await?;

        info!(user_id, role = %model.role, "User updated by admin");
        Ok(model.into())
    }

    /// Removes an account along with its cart, favorites and reviews.
    /// Accounts with order history are kept.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: i32, acting_user_id: i32) -> Result<(), ServiceError> {
        if user_id == acting_user_id {
            return Err(ServiceError::BadRequest(
                "You cannot delete your own account.".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let existing = user::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .count(&txn)
            .await?;
        if orders > 0 {
            return Err(ServiceError::Conflict(
                "User has orders and cannot be deleted".to_string(),
            ));
        }

        if let Some(user_cart) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::CartId.eq(user_cart.id))
                .exec(&txn)
                .await?;
            cart::Entity::delete_by_id(user_cart.id).exec(&txn).await?;
        }
        favorite::Entity::delete_many()
            .filter(favorite::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        let reviewed: BTreeSet<i32> = product_review::Entity::find()
            .filter(product_review::Column::UserId.eq(user_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.product_id)
            .collect();
        product_review::Entity::delete_many()
            .filter(product_review::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        for product_id in reviewed {
            recompute_product_rating(&txn, product_id).await?;
        }

        user::Entity::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;

        info!(user_id, acting_user_id, "User deleted");
        Ok(())
    }

    /// Creates the configured admin account on first start. Returns whether
    /// an account was created.
    #[instrument(skip(self, bootstrap), fields(username = %bootstrap.username))]
    pub async fn ensure_admin_account(
        &self,
        bootstrap: &AdminBootstrapConfig,
    ) -> Result<bool, ServiceError> {
        if find_by_username(&*self.db, &bootstrap.username)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        self.create_local_user(
            RegisterUser {
                username: bootstrap.username.clone(),
                password: bootstrap.password.clone(),
                email: bootstrap.email.clone(),
                first_name: Some("Admin".to_string()),
                last_name: None,
                phone: None,
                address: None,
                date_of_birth: None,
            },
            Role::Admin,
        )
        .await?;
        Ok(true)
    }

    async fn find(&self, user_id: i32) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))
    }
}

async fn find_by_username<C: ConnectionTrait>(
    conn: &C,
    username: &str,
) -> Result<Option<user::Model>, ServiceError> {
    Ok(user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(conn)
        .await?)
}

pub(crate) async fn find_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Option<user::Model>, ServiceError> {
    Ok(user::Entity::find()
        .filter(user::Column::Email.eq(email.trim()))
        .one(conn)
        .await?)
}

fn apply_profile(active: &mut user::ActiveModel, update: ProfileUpdate) {
    if let Some(first_name) = update.first_name {
        active.first_name = Set(Some(first_name));
    }
    if let Some(last_name) = update.last_name {
        active.last_name = Set(Some(last_name));
    }
    if let Some(phone) = update.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(address) = update.address {
        active.address = Set(Some(address));
    }
    if let Some(date_of_birth) = update.date_of_birth {
        active.date_of_birth = Set(Some(date_of_birth));
    }
}

/// Splits a display name on the first space into first and last name.
fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(' ') {
        Some((first, last)) => (
            Some(first.to_string()),
            Some(last.trim().to_string()).filter(|l| !l.is_empty()),
        ),
        None => (Some(name.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_on_first_space() {
        assert_eq!(
            split_name(Some("Tran Thi Bich")),
            (Some("Tran".into()), Some("Thi Bich".into()))
        );
        assert_eq!(split_name(Some("Linh")), (Some("Linh".into()), None));
        assert_eq!(split_name(Some("  ")), (None, None));
        assert_eq!(split_name(None), (None, None));
    }

    #[test]
    fn register_validation() {
        let ok = RegisterUser {
            username: "buyer01".into(),
            password: "secret1".into(),
            email: "buyer01@example.vn".into(),
            first_name: None,
            last_name: None,
            phone: Some("0901234567".into()),
            address: None,
            date_of_birth: None,
        };
        assert!(ok.validate().is_ok());

        let mut short = ok.clone();
        short.username = "ab".into();
        assert!(short.validate().is_err());

        let mut weak = ok.clone();
        weak.password = "12345".into();
        assert!(weak.validate().is_err());

        let mut bad_email = ok;
        bad_email.email = "not-an-email".into();
        assert!(bad_email.validate().is_err());
    }
}
