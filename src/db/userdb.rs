// db/userdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::usermodel::User;

#[async_trait]
pub trait UserExt {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn save_user<T: Into<String> + Send>(
        &self,
        name: T,
        email: T,
        password: T,
    ) -> Result<User, sqlx::Error>;

    async fn update_bank_account(
        &self,
        user_id: Uuid,
        bank_account_name: String,
        bank_account_number: String,
        bank_code: String,
    ) -> Result<User, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>(
                r#"
                SELECT id, name, email, password,
                    bank_account_name, bank_account_number, bank_code,
                    created_at, updated_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(email) = email {
            user = sqlx::query_as::<_, User>(
                r#"
                SELECT id, name, email, password,
                    bank_account_name, bank_account_number, bank_code,
                    created_at, updated_at
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        }

        Ok(user)
    }

    async fn save_user<T: Into<String> + Send>(
        &self,
        name: T,
        email: T,
        password: T,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password,
                bank_account_name, bank_account_number, bank_code,
                created_at, updated_at
            "#,
        )
        .bind(name.into())
        .bind(email.into())
        .bind(password.into())
        .fetch_one(&self.pool)
        .await
    }

    async fn update_bank_account(
        &self,
        user_id: Uuid,
        bank_account_name: String,
        bank_account_number: String,
        bank_code: String,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET bank_account_name = $2, bank_account_number = $3, bank_code = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, password,
                bank_account_name, bank_account_number, bank_code,
                created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(bank_account_name)
        .bind(bank_account_number)
        .bind(bank_code)
        .fetch_one(&self.pool)
        .await
    }
}
