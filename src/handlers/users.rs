use crate::accounts::{INVALID_PASSWORD, NewAccount};
use crate::errors::{ApiError, ApiResult};
use crate::extractors::{CurrentUser, JsonBody, ValidatedJson, field_errors, parse_id};
use crate::mail::PasswordResetEmail;
use crate::schemas::AppState;
use auth::{ResetSubject, UserAttributes, decode_uid, encode_uid};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use common::{BLANK_FIELD, ErrorDetail, FieldErrors, UserDto};
use model::entities::user;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;
use validator::Validate;

const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";
const USERNAME_MISMATCH: &str = "The two username fields didn't match.";
const INVALID_UID: &str = "Invalid user id or user doesn't exist.";
const INVALID_TOKEN: &str = "Invalid token for given user.";

/// Registration body. Also the body of a full update.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    /// Letters, digits and @/./+/-/_ only
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
    /// Optional display name
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub password: Option<String>,
    /// Must repeat `password`
    #[validate(required(message = "This field is required."))]
    pub re_password: Option<String>,
}

/// Partial update body. Absent fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PartialUpdateUserRequest {
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub username: Option<String>,
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Ensure this field has no more than 255 characters.")
    )]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
}

/// Confirmation of the caller's password, required to delete an account.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CurrentPasswordRequest {
    #[validate(required(message = "This field is required."))]
    pub current_password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SetPasswordRequest {
    #[validate(required(message = "This field is required."))]
    pub new_password: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub re_new_password: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub current_password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SetUsernameRequest {
    #[validate(
        required(message = "This field is required."),
        length(max = 150, message = "Ensure this field has no more than 150 characters.")
    )]
    pub new_username: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub re_new_username: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub current_password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ResetPasswordRequest {
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address.")
    )]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ResetPasswordConfirmRequest {
    /// Account reference from the reset e-mail
    #[validate(required(message = "This field is required."))]
    pub uid: Option<String>,
    /// One-time token from the reset e-mail
    #[validate(required(message = "This field is required."))]
    pub token: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub new_password: Option<String>,
    #[validate(required(message = "This field is required."))]
    pub re_new_password: Option<String>,
}

/// Loads the account `user_id` on behalf of `caller`.
///
/// With hidden users, accounts the caller may not see do not exist for them.
async fn load_for(state: &AppState, caller: &user::Model, user_id: i32) -> ApiResult<user::Model> {
    let allowed = caller.is_staff || caller.id == user_id;
    if state.settings.hide_users && !allowed {
        debug!(caller = caller.id, user_id, "Hidden account requested");
        return Err(ApiError::NotFound);
    }

    let target = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !allowed {
        return Err(ApiError::PermissionDenied);
    }
    Ok(target)
}

/// Create a new account
#[utoipa::path(
    post,
    path = "/api/v1/users/",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = UserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
    )
)]
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    body: JsonBody,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    trace!("Entering create_user function");
    let new = full_fields(&state, body.deserialize()?, None).await?;
    let account = state.accounts().insert(new).await?;

    info!("User registered with ID: {}", account.id);
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// Shared validation of registration and full-update bodies.
///
/// Every field is checked in one pass: presence and syntax, then
/// uniqueness and the password policy for the fields that passed. Only a
/// body without field errors is checked for matching passwords.
async fn full_fields(
    state: &AppState,
    request: CreateUserRequest,
    exclude: Option<i32>,
) -> ApiResult<NewAccount> {
    let mut errors = request
        .validate()
        .err()
        .map(|errors| field_errors(&errors))
        .unwrap_or_default();

    let mut blank = FieldErrors::new();
    for (field, value) in [
        ("username", &request.username),
        ("email", &request.email),
        ("password", &request.password),
        ("re_password", &request.re_password),
    ] {
        if value.as_deref().is_some_and(|value| value.trim().is_empty()) {
            blank.add(field, BLANK_FIELD);
        }
    }
    errors.retain(|field| !blank.contains(field));
    errors.merge(blank);

    let accounts = state.accounts();
    let username = request.username.as_deref().filter(|_| !errors.contains("username"));
    let email = request.email.as_deref().filter(|_| !errors.contains("email"));
    let mut identity = FieldErrors::new();
    accounts.check_identity(username, email, exclude, &mut identity).await?;

    if let Some(password) = request.password.as_deref().filter(|_| !errors.contains("password")) {
        let attributes = UserAttributes {
            username: request.username.as_deref().unwrap_or_default(),
            email: request.email.as_deref().unwrap_or_default(),
            ..Default::default()
        };
        accounts.check_password("password", password, &attributes, &mut identity);
    }
    errors.merge(identity);
    errors.into_result()?;

    let (Some(username), Some(email), Some(password), Some(re_password)) = (
        request.username,
        request.email,
        request.password,
        request.re_password,
    ) else {
        // Presence was enforced by the rules above.
        return Err(ApiError::Validation(FieldErrors::new()));
    };
    if password != re_password {
        return Err(mismatch(PASSWORD_MISMATCH));
    }

    Ok(NewAccount {
        username,
        email,
        name: request.name,
        password,
        ..Default::default()
    })
}

fn mismatch(message: &str) -> ApiError {
    let mut errors = FieldErrors::new();
    errors.add_non_field(message);
    ApiError::Validation(errors)
}

/// List accounts visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/users/",
    tag = "users",
    responses(
        (status = 200, description = "Accounts retrieved", body = Vec<UserDto>),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> ApiResult<Json<Vec<UserDto>>> {
    trace!("Entering list_users function");

    if state.settings.hide_users && !caller.is_staff {
        debug!("Hidden users: listing only the caller");
        return Ok(Json(vec![caller.into()]));
    }

    let accounts = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;
    debug!("Retrieved {} accounts", accounts.len());

    Ok(Json(accounts.into_iter().map(UserDto::from).collect()))
}

/// Get an account by ID
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/",
    tag = "users",
    params(("user_id" = i32, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account retrieved", body = UserDto),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserDto>> {
    let target = load_for(&state, &caller, parse_id(&user_id)?).await?;
    Ok(Json(target.into()))
}

/// Replace an account
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/",
    tag = "users",
    params(("user_id" = i32, Path, description = "Account ID")),
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
    body: JsonBody,
) -> ApiResult<Json<UserDto>> {
    let target = load_for(&state, &caller, parse_id(&user_id)?).await?;
    let request: CreateUserRequest = body.deserialize()?;
    replace(&state, target, request).await.map(Json)
}

async fn replace(state: &AppState, target: user::Model, request: CreateUserRequest) -> ApiResult<UserDto> {
    let new = full_fields(state, request, Some(target.id)).await?;

    let mut active: user::ActiveModel = target.into();
    active.password = Set(state.accounts().hash(&new.password)?);
    active.username = Set(new.username);
    active.email = Set(new.email);
    active.name = Set(new.name);

    let account = active
        .update(&state.db)
        .await
        .map_err(crate::accounts::unique_violation)?;
    info!("Account {} replaced", account.id);
    Ok(account.into())
}

/// Update some fields of an account
#[utoipa::path(
    patch,
    path = "/api/v1/users/{user_id}/",
    tag = "users",
    params(("user_id" = i32, Path, description = "Account ID")),
    request_body = PartialUpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn partial_update_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
    body: JsonBody,
) -> ApiResult<Json<UserDto>> {
    let target = load_for(&state, &caller, parse_id(&user_id)?).await?;
    let request: PartialUpdateUserRequest = body.parse()?;
    patch(&state, target, request).await.map(Json)
}

async fn patch(state: &AppState, target: user::Model, request: PartialUpdateUserRequest) -> ApiResult<UserDto> {
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

    let account = active
        .update(&state.db)
        .await
        .map_err(crate::accounts::unique_violation)?;
    info!("Account {} updated", account.id);
    Ok(account.into())
}

/// Delete an account
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/",
    tag = "users",
    params(("user_id" = i32, Path, description = "Account ID")),
    request_body = CurrentPasswordRequest,
    responses(
        (status = 204, description = "Account deleted"),
        (status = 400, description = "Missing or wrong current password", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 404, description = "Account not found", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id, user_id = %user_id))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(user_id): Path<String>,
    body: JsonBody,
) -> ApiResult<StatusCode> {
    let target = load_for(&state, &caller, parse_id(&user_id)?).await?;
    let request: CurrentPasswordRequest = body.parse()?;
    destroy(&state, &caller, target, request).await
}

async fn destroy(
    state: &AppState,
    caller: &user::Model,
    target: user::Model,
    request: CurrentPasswordRequest,
) -> ApiResult<StatusCode> {
    confirm_password(state, caller, request.current_password.as_deref())?;

    let user_id = target.id;
    match user::Entity::delete_by_id(user_id).exec(&state.db).await {
        Ok(result) if result.rows_affected > 0 => {
            info!("Account {} deleted by {}", user_id, caller.id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(_) => {
            warn!("Account {} vanished before deletion", user_id);
            Err(ApiError::NotFound)
        }
        Err(db_error) => {
            error!("Failed to delete account {}: {}", user_id, db_error);
            Err(db_error.into())
        }
    }
}

fn confirm_password(state: &AppState, caller: &user::Model, password: Option<&str>) -> ApiResult<()> {
    if state.accounts().verify(caller, password.unwrap_or_default()) {
        Ok(())
    } else {
        debug!(caller = caller.id, "Current password rejected");
        Err(ApiError::field("current_password", INVALID_PASSWORD))
    }
}

/// Get the caller's account
#[utoipa::path(
    get,
    path = "/api/v1/users/me/",
    tag = "users",
    responses(
        (status = 200, description = "Account retrieved", body = UserDto),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn get_me(CurrentUser(caller): CurrentUser) -> Json<UserDto> {
    Json(caller.into())
}

/// Replace the caller's account
#[utoipa::path(
    put,
    path = "/api/v1/users/me/",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    body: JsonBody,
) -> ApiResult<Json<UserDto>> {
    replace(&state, caller, body.deserialize()?).await.map(Json)
}

/// Update some fields of the caller's account
#[utoipa::path(
    patch,
    path = "/api/v1/users/me/",
    tag = "users",
    request_body = PartialUpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserDto),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn partial_update_me(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidatedJson(request): ValidatedJson<PartialUpdateUserRequest>,
) -> ApiResult<Json<UserDto>> {
    patch(&state, caller, request).await.map(Json)
}

/// Delete the caller's account
#[utoipa::path(
    delete,
    path = "/api/v1/users/me/",
    tag = "users",
    request_body = CurrentPasswordRequest,
    responses(
        (status = 204, description = "Account deleted"),
        (status = 400, description = "Missing or wrong current password", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    body: JsonBody,
) -> ApiResult<StatusCode> {
    let request: CurrentPasswordRequest = body.parse()?;
    let target = caller.clone();
    destroy(&state, &caller, target, request).await
}

/// Change the caller's password
#[utoipa::path(
    post,
    path = "/api/v1/users/set_password/",
    tag = "users",
    request_body = SetPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn set_password(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidatedJson(request): ValidatedJson<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let new_password = request.new_password.unwrap_or_default();
    let accounts = state.accounts();

    let mut errors = FieldErrors::new();
    accounts.check_password("new_password", &new_password, &attributes_of(&caller), &mut errors);
    if !accounts.verify(&caller, request.current_password.as_deref().unwrap_or_default()) {
        errors.add("current_password", INVALID_PASSWORD);
    }
    errors.into_result()?;

    if request.re_new_password.as_deref() != Some(new_password.as_str()) {
        return Err(mismatch(PASSWORD_MISMATCH));
    }

    accounts.set_password(caller, &new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn attributes_of(account: &user::Model) -> UserAttributes<'_> {
    UserAttributes {
        username: &account.username,
        email: &account.email,
        first_name: &account.first_name,
        last_name: &account.last_name,
    }
}

/// Change the caller's username
#[utoipa::path(
    post,
    path = "/api/v1/users/set_username/",
    tag = "users",
    request_body = SetUsernameRequest,
    responses(
        (status = 204, description = "Username changed"),
        (status = 400, description = "Invalid input", body = FieldErrors),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
    ),
    security(("jwt" = []))
)]
#[instrument(skip_all, fields(caller = caller.id))]
pub async fn set_username(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidatedJson(request): ValidatedJson<SetUsernameRequest>,
) -> ApiResult<StatusCode> {
    let new_username = request.new_username.unwrap_or_default();
    let accounts = state.accounts();

    let mut identity = FieldErrors::new();
    accounts
        .check_identity(Some(&new_username), None, Some(caller.id), &mut identity)
        .await?;
    let mut errors = FieldErrors::new();
    if let Some(messages) = identity.get("username") {
        errors.extend_field("new_username", messages.iter().cloned());
    }
    if !accounts.verify(&caller, request.current_password.as_deref().unwrap_or_default()) {
        errors.add("current_password", INVALID_PASSWORD);
    }
    errors.into_result()?;

    if request.re_new_username.as_deref() != Some(new_username.as_str()) {
        return Err(mismatch(USERNAME_MISMATCH));
    }

    let old_username = caller.username.clone();
    let mut active: user::ActiveModel = caller.into();
    active.username = Set(new_username);
    let account = active
        .update(&state.db)
        .await
        .map_err(crate::accounts::unique_violation)?;

    info!("Account {} renamed from {} to {}", account.id, old_username, account.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Request a password-reset e-mail
///
/// Always answers 204 for a well-formed address so the endpoint cannot be
/// used to discover which addresses have accounts.
#[utoipa::path(
    post,
    path = "/api/v1/users/reset_password/",
    tag = "users",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Request accepted"),
        (status = 400, description = "Invalid input", body = FieldErrors),
    )
)]
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let email = request.email.unwrap_or_default();

    let Some(account) = user::Entity::find_by_email(&email).one(&state.db).await? else {
        debug!("Password reset requested for an unknown address");
        return Ok(StatusCode::NO_CONTENT);
    };
    if !account.is_active {
        return Ok(StatusCode::NO_CONTENT);
    }

    let uid = encode_uid(account.id);
    let token = state.reset_tokens.make_token(&reset_subject(&account));
    let recipient = UserDto::from(account);

    let message = PasswordResetEmail {
        user: &recipient,
        uid: &uid,
        token: &token,
    }
    .render(&state.settings, &state.emails)?;

    state.mailer.send(message).await?;
    info!("Password reset e-mail sent to account {}", recipient.id);
    Ok(StatusCode::NO_CONTENT)
}

fn reset_subject(account: &user::Model) -> ResetSubject<'_> {
    ResetSubject {
        user_id: account.id,
        password_hash: &account.password,
        last_login: account.last_login,
        email: &account.email,
    }
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/v1/users/reset_password_confirm/",
    tag = "users",
    request_body = ResetPasswordConfirmRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid uid, token or password", body = FieldErrors),
    )
)]
#[instrument(skip_all)]
pub async fn reset_password_confirm(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ResetPasswordConfirmRequest>,
) -> ApiResult<StatusCode> {
    let uid = request.uid.unwrap_or_default();
    let token = request.token.unwrap_or_default();
    let new_password = request.new_password.unwrap_or_default();

    let account = match decode_uid(&uid) {
        Ok(user_id) => user::Entity::find_by_id(user_id).one(&state.db).await?,
        Err(_) => None,
    };
    let Some(account) = account else {
        debug!("Reset confirmation with unknown uid");
        return Err(ApiError::field("uid", INVALID_UID));
    };

    if !state.reset_tokens.check_token(&reset_subject(&account), &token) {
        debug!(user_id = account.id, "Reset token rejected");
        return Err(ApiError::field("token", INVALID_TOKEN));
    }

    let accounts = state.accounts();
    let mut errors = FieldErrors::new();
    accounts.check_password("new_password", &new_password, &attributes_of(&account), &mut errors);
    errors.into_result()?;

    if request.re_new_password.as_deref() != Some(new_password.as_str()) {
        return Err(mismatch(PASSWORD_MISMATCH));
    }

    let mut active: user::ActiveModel = account.into();
    active.password = Set(accounts.hash(&new_password)?);
    // A login timestamp change also retires the token just used.
    active.last_login = Set(Some(Utc::now()));
    let account = active.update(&state.db).await?;

    info!("Password reset completed for account {}", account.id);
    Ok(StatusCode::NO_CONTENT)
}
