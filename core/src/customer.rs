//! Customer — a tenant-scoped contact profile.

use crate::ids::{CustomerId, TenantId};
use serde::{Deserialize, Serialize};

/// A customer's contact details, as submitted on a booking request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerFields {
    /// Display name.
    pub name: String,
    /// Phone number, if collected.
    #[serde(default)]
    pub phone: Option<String>,
    /// Email address, if collected.
    #[serde(default)]
    pub email: Option<String>,
    /// Chat-platform user id (LINE/Telegram/etc.), if the request came through
    /// a chat-messenger mini-app.
    #[serde(default)]
    pub chat_user_id: Option<String>,
}

/// A tenant-scoped customer record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    /// Primary key.
    pub id: CustomerId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Contact fields, upserted from the most recent booking request.
    pub fields: CustomerFields,
}
