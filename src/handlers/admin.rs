//! Administrative console. Every endpoint requires a staff account.

use crate::accounts::NewAccount;
use crate::errors::{ApiError, ApiResult};
use crate::extractors::{CurrentUser, ValidatedJson, parse_id};
use crate::schemas::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use common::{AdminUserDto, ErrorDetail, FieldErrors};
use model::entities::user;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Console landing page
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SiteIndex {
    pub site_name: String,
    pub accounts: u64,
    pub staff: u64,
    pub superusers: u64,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(
        required(message = "This field is required."),
        length(max = 150, message = "Ensure this field has no more than 150 characters.")
    )]
    pub username: Option<String>,
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Ensure this field has no more than 255 characters.")
    )]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub password: Option<String>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

/// Console edit form. `is_active` is accepted, but accounts are always saved active.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub username: Option<String>,
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Ensure this field has no more than 255 characters.")
    )]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_active: Option<bool>,
}

fn require_staff(caller: &user::Model) -> ApiResult<()> {
    if caller.is_staff {
        Ok(())
    } else {
        warn!(caller = caller.id, "Non-staff account refused from the console");
        Err(ApiError::PermissionDenied)
    }
}

async fn find_account(state: &AppState, user_id: i32) -> ApiResult<user::Model> {
    user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Console index with account counts
#[utoipa::path(
    get,
    path = "/admin/",
    tag = "admin",
    responses(
        (status = 200, description = "Console index", body = SiteIndex),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 403, description = "Not a staff account", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn site_index(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> ApiResult<Json<SiteIndex>> {
    require_staff(&caller)?;

    let accounts = user::Entity::find().count(&state.db).await?;
    let staff = user::Entity::find()
        .filter(user::Column::IsStaff.eq(true))
        .count(&state.db)
        .await?;
    let superusers = user::Entity::find()
        .filter(user::Column::IsSuperuser.eq(true))
        .count(&state.db)
        .await?;

    Ok(Json(SiteIndex {
        site_name: state.settings.password_reset.site_name.clone(),
        accounts,
        staff,
        superusers,
    }))
}

/// List every account
#[utoipa::path(
    get,
    path = "/admin/users/",
    tag = "admin",
    responses(
        (status = 200, description = "Accounts", body = Vec<AdminUserDto>),
        (status = 403, description = "Not a staff account", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn list_accounts(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> ApiResult<Json<Vec<AdminUserDto>>> {
    require_staff(&caller)?;

    let accounts = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;
    debug!("Console listing {} accounts", accounts.len());
    Ok(Json(accounts.into_iter().map(AdminUserDto::from).collect()))
}

/// Create an account, optionally with staff rights
#[utoipa::path(
    post,
    path = "/admin/users/",
    tag = "admin",
    request_body = AdminCreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = AdminUserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 403, description = "Not a staff account", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn create_account(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidatedJson(request): ValidatedJson<AdminCreateUserRequest>,
) -> ApiResult<(StatusCode, Json<AdminUserDto>)> {
    require_staff(&caller)?;

    let account = state
        .accounts()
        .create(NewAccount {
            username: request.username.unwrap_or_default(),
            email: request.email.unwrap_or_default(),
            name: request.name,
            password: request.password.unwrap_or_default(),
            is_staff: request.is_staff.unwrap_or(false),
            is_superuser: request.is_superuser.unwrap_or(false),
        })
        .await?;

    info!("Account {} created from the console by {}", account.id, caller.id);
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// Get one account
#[utoipa::path(
    get,
    path = "/admin/users/{user_id}/",
    tag = "admin",
    params(("user_id" = i32, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account", body = AdminUserDto),
        (status = 403, description = "Not a staff account", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn get_account(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<AdminUserDto>> {
    require_staff(&caller)?;
    Ok(Json(find_account(&state, parse_id(&user_id)?).await?.into()))
}

/// Edit an account
#[utoipa::path(
    patch,
    path = "/admin/users/{user_id}/",
    tag = "admin",
    params(("user_id" = i32, Path, description = "Account ID")),
    request_body = AdminUpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = AdminUserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 403, description = "Not a staff account", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
    ValidatedJson(request): ValidatedJson<AdminUpdateUserRequest>,
) -> ApiResult<Json<AdminUserDto>> {
    require_staff(&caller)?;
    let target = find_account(&state, parse_id(&user_id)?).await?;

    let mut errors = FieldErrors::new();
    state
        .accounts()
        .check_identity(
            request.username.as_deref(),
            request.email.as_deref(),
            Some(target.id),
            &mut errors,
        )
        .await?;
    errors.into_result()?;

    let target_id = target.id;
    let mut active: user::ActiveModel = target.into();
    if let Some(username) = request.username {
        active.username = Set(username);
    }
    if let Some(email) = request.email {
        active.email = Set(email);
    }
    if let Some(name) = request.name {
        active.name = Set(Some(name));
    }
    if let Some(is_staff) = request.is_staff {
        active.is_staff = Set(is_staff);
    }
    if let Some(is_superuser) = request.is_superuser {
        active.is_superuser = Set(is_superuser);
    }
    if let Some(is_active) = request.is_active {
        if !is_active {
            debug!(user_id = target_id, "Deactivation requested; accounts are always saved active");
        }
        active.is_active = Set(is_active);
    }

    let account = active
        .update(&state.db)
        .await
        .map_err(crate::accounts::unique_violation)?;
    info!("Account {} edited from the console by {}", account.id, caller.id);
    Ok(Json(account.into()))
}

/// Delete an account
#[utoipa::path(
    delete,
    path = "/admin/users/{user_id}/",
    tag = "admin",
    params(("user_id" = i32, Path, description = "Account ID")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Not a staff account", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    require_staff(&caller)?;
    let user_id = parse_id(&user_id)?;

    let result = user::Entity::delete_by_id(user_id).exec(&state.db).await?;
    if result.rows_affected == 0 {
        return Err(ApiError::NotFound);
    }

    info!("Account {} deleted from the console by {}", user_id, caller.id);
    Ok(StatusCode::NO_CONTENT)
}
