use crate::domain::errors::DispatchResult;
use crate::domain::ports::{CustomerSummary, Directory, UserSummary};
use crate::infrastructure::persistence::Database;
use async_trait::async_trait;
use sqlx::Row;

#[async_trait]
impl Directory for Database {
    async fn find_customer_by_phone(
        &self,
        phone: &str,
    ) -> DispatchResult<Option<CustomerSummary>> {
        let row = sqlx::query(
            "SELECT id, cif_number, full_name, phone, segment
             FROM customers
             WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(CustomerSummary {
                id: row.try_get("id")?,
                cif_number: row.try_get("cif_number").ok(),
                full_name: row.try_get("full_name")?,
                phone: row.try_get("phone").ok(),
                segment: row.try_get("segment").ok(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn find_user_by_id(&self, id: &str) -> DispatchResult<Option<UserSummary>> {
        let row = sqlx::query(
            "SELECT id, username, full_name
             FROM users
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(UserSummary {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                full_name: row.try_get("full_name").ok(),
            }))
        } else {
            Ok(None)
        }
    }
}
