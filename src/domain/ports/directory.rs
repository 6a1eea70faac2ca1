use crate::domain::errors::DispatchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the dispatcher needs to know about a customer the directory resolved
/// from a caller number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: String,
    pub cif_number: Option<String>,
    pub full_name: String,
    pub phone: Option<String>,
    pub segment: Option<String>,
}

/// Display identity for an agent's underlying CRM user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
}

/// Read-only lookups into the CRM customer/user directory. Lookups are
/// best-effort from the dispatcher's point of view: absence is never an error
/// and failures degrade to "unknown caller".
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_customer_by_phone(&self, phone: &str)
        -> DispatchResult<Option<CustomerSummary>>;
    async fn find_user_by_id(&self, id: &str) -> DispatchResult<Option<UserSummary>>;
}
