//! Root for all SeaORM entity modules.
//! The account record is the only persisted entity; tokens and sessions are
//! never stored.

pub mod user;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::user::Entity as User;
}

#[cfg(test)]
mod test {
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{
        ActiveModelTrait, Database, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Set,
    };

    use super::*;
    use prelude::*;

    async fn setup_db() -> Result<DatabaseConnection, DbErr> {
        let db = Database::connect("sqlite::memory:").await?;
        Migrator::up(&db, None).await.expect("Migrations failed.");
        Ok(db)
    }

    fn new_user(username: &str, email: &str) -> user::ActiveModel {
        user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password: Set("not-a-real-hash".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_forces_active() -> Result<(), DbErr> {
        let db = setup_db().await?;

        let mut inactive = new_user("dormant", "dormant@example.com");
        inactive.is_active = Set(false);
        let created = inactive.insert(&db).await?;

        assert!(created.is_active);
        assert!(!created.is_staff);
        assert!(!created.is_superuser);
        assert_eq!(created.first_name, "");

        let stored = User::find_by_id(created.id).one(&db).await?.unwrap();
        assert!(stored.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_forces_active() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let created = new_user("someone", "someone@example.com").insert(&db).await?;

        let mut active: user::ActiveModel = created.into_active_model();
        active.is_active = Set(false);
        active.name = Set(Some("Some One".to_string()));
        let updated = active.update(&db).await?;

        assert!(updated.is_active);
        assert_eq!(updated.name.as_deref(), Some("Some One"));

        let stored = User::find_by_id(updated.id).one(&db).await?.unwrap();
        assert!(stored.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_path_forces_active() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let mut fresh = new_user("saved", "saved@example.com");
        fresh.is_active = Set(false);

        let saved = fresh.save(&db).await?;
        let id = saved.id.clone().unwrap();
        let stored = User::find_by_id(id).one(&db).await?.unwrap();
        assert!(stored.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_username_and_email_are_unique() -> Result<(), DbErr> {
        let db = setup_db().await?;
        new_user("taken", "taken@example.com").insert(&db).await?;

        let same_username = new_user("taken", "other@example.com").insert(&db).await;
        assert!(same_username.is_err());

        let same_email = new_user("other", "taken@example.com").insert(&db).await;
        assert!(same_email.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_helpers() -> Result<(), DbErr> {
        let db = setup_db().await?;
        let created = new_user("lookup", "lookup@example.com").insert(&db).await?;

        let by_username = User::find_by_username("lookup").one(&db).await?.unwrap();
        assert_eq!(by_username.id, created.id);
        assert_eq!(by_username.email, "lookup@example.com");

        let by_email = User::find_by_email("lookup@example.com").one(&db).await?.unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(User::find_by_username("missing").one(&db).await?.is_none());
        Ok(())
    }
}
