use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MethodEntry;

/// A contact as stored. `created_time` is kept as RFC 3339 text in the
/// database and parsed on the way out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub is_favorite: bool,
    pub created_time: DateTime<Utc>,
}

/// A contact together with its full method set, as the API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactWithMethods {
    pub id: i64,
    pub name: String,
    pub is_favorite: bool,
    pub created_time: DateTime<Utc>,
    pub methods: Vec<MethodEntry>,
}

impl ContactWithMethods {
    pub fn new(contact: Contact, methods: Vec<MethodEntry>) -> Self {
        Self {
            id: contact.id,
            name: contact.name,
            is_favorite: contact.is_favorite,
            created_time: contact.created_time,
            methods,
        }
    }
}

/// Aggregate counts over the contact book. Contacts with several phones or
/// emails count once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactStats {
    pub total_contacts: i64,
    pub favorite_contacts: i64,
    pub contacts_with_phone: i64,
    pub contacts_with_email: i64,
}
