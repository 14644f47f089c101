use async_trait::async_trait;
use chrono::Utc;
use common::{AdminUserDto, UserDto};
use sea_orm::entity::prelude::*;
use sea_orm::{QueryFilter, Set};
use tracing::trace;

/// A user account of the system.
///
/// Every save that goes through [`ActiveModel`] (`insert`, `update`, `save`)
/// passes [`ActiveModelBehavior::before_save`], which forces `is_active` back
/// to `true`. Bulk statements (`Entity::update_many`, `Entity::insert_many`)
/// do not run the hook and must not be used to write accounts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// Argon2 PHC string. Never leaves the server.
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTimeUtc>,
    pub date_joined: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        // Accounts can never be written in an inactive state.
        self.is_active = Set(true);

        if insert {
            if self.date_joined.is_not_set() {
                self.date_joined = Set(Utc::now());
            }
            if self.first_name.is_not_set() {
                self.first_name = Set(String::new());
            }
            if self.last_name.is_not_set() {
                self.last_name = Set(String::new());
            }
            if self.is_staff.is_not_set() {
                self.is_staff = Set(false);
            }
            if self.is_superuser.is_not_set() {
                self.is_superuser = Set(false);
            }
        }

        trace!(insert, "Saving user account");
        Ok(self)
    }
}

impl Entity {
    pub fn find_by_username(username: &str) -> Select<Entity> {
        Self::find().filter(Column::Username.eq(username))
    }

    pub fn find_by_email(email: &str) -> Select<Entity> {
        Self::find().filter(Column::Email.eq(email))
    }
}

impl From<Model> for UserDto {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            name: model.name,
        }
    }
}

impl From<Model> for AdminUserDto {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            name: model.name,
            first_name: model.first_name,
            last_name: model.last_name,
            is_active: model.is_active,
            is_staff: model.is_staff,
            is_superuser: model.is_superuser,
            last_login: model.last_login,
            date_joined: model.date_joined,
        }
    }
}
