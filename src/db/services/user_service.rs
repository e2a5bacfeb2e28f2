use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};

use crate::db::entities::user;
use crate::db::enums::UserRole;

pub async fn find_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
}

pub async fn create(
    db: &DatabaseConnection,
    username: &str,
    password_hash: &str,
    role: UserRole,
) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(password_hash.to_string()),
        role: Set(role),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Creates the admin account, or resets its password and role if the
/// username already exists. Used by the `seed-admin` CLI subcommand.
pub async fn seed_admin(
    db: &DatabaseConnection,
    username: &str,
    password_hash: &str,
) -> Result<user::Model, DbErr> {
    match find_by_username(db, username).await? {
        None => create(db, username, password_hash, UserRole::Admin).await,
        Some(existing) => {
            let mut active: user::ActiveModel = existing.into();
            active.password_hash = Set(password_hash.to_string());
            active.role = Set(UserRole::Admin);
            active.updated_at = Set(Utc::now());
            active.update(db).await
        }
    }
}
