use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::User;

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";

/// Looks up a user by exact username
pub async fn find_by_username(pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Inserts a new user, mapping a duplicate username to a conflict
pub async fn create(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> AppResult<User> {
    let result = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password_hash, created_at) \
         VALUES (?, ?, ?, ?) RETURNING {USER_COLUMNS}"
    ))
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(user),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(AppError::Conflict("Username already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init_schema};

    async fn pool() -> SqlitePool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let pool = pool().await;
        let created = create(&pool, "asha", "asha@example.com", "hash").await.unwrap();

        let found = find_by_username(&pool, "asha").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email, "asha@example.com");

        assert!(find_by_username(&pool, "ravi").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let pool = pool().await;
        create(&pool, "asha", "asha@example.com", "hash").await.unwrap();

        let err = create(&pool, "asha", "other@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
