use chrono::Utc;
use rusqlite::{params, Row};
use std::collections::HashMap;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Contact, ContactMethod, ContactStats, ContactWithMethods, MethodEntry, MethodInput};

/// Favorites first, then newest-created first. `id` breaks ties between
/// contacts created in the same instant.
const CONTACT_ORDER: &str = "is_favorite DESC, created_time DESC, id DESC";

impl Database {
    // ==================== CREATE ====================

    /// Insert a contact together with its well-formed methods in one
    /// transaction. Method entries missing a type or value are dropped.
    pub fn add_contact(
        &self,
        name: &str,
        is_favorite: bool,
        methods: &[MethodInput],
    ) -> Result<Contact> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("name is required".into()));
        }

        let created_time = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO contacts (name, is_favorite, created_time) VALUES (?, ?, ?)",
            params![name, is_favorite as i32, created_time.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();

        for method in methods {
            if let Some((method_type, value)) = method.well_formed() {
                tx.execute(
                    "INSERT INTO contact_methods (contact_id, method_type, method_value) VALUES (?, ?, ?)",
                    params![id, method_type, value],
                )?;
            }
        }
        tx.commit()?;

        Ok(Contact {
            id,
            name: name.to_string(),
            is_favorite,
            created_time,
        })
    }

    // ==================== READ ====================

    pub fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, is_favorite, created_time FROM contacts WHERE id = ?")?;

        match stmt.query_row([id], Self::row_to_contact) {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All contacts with their methods attached, favorites first then newest.
    pub fn list_contacts(&self) -> Result<Vec<ContactWithMethods>> {
        let sql = format!(
            "SELECT id, name, is_favorite, created_time FROM contacts ORDER BY {}",
            CONTACT_ORDER
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let contacts = stmt
            .query_map([], Self::row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let methods = self.all_methods()?;
        Ok(attach_methods(contacts, methods))
    }

    /// Favorite contacts only, newest first.
    pub fn list_favorites(&self) -> Result<Vec<ContactWithMethods>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, is_favorite, created_time FROM contacts
             WHERE is_favorite = 1
             ORDER BY created_time DESC, id DESC",
        )?;
        let contacts = stmt
            .query_map([], Self::row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let ids: Vec<i64> = contacts.iter().map(|c| c.id).collect();
        let methods = self.methods_for(&ids)?;
        Ok(attach_methods(contacts, methods))
    }

    /// Case-insensitive substring search over contact names and method
    /// values. An empty keyword matches everything.
    pub fn search_contacts(&self, keyword: &str) -> Result<Vec<ContactWithMethods>> {
        let pattern = format!("%{}%", escape_like(keyword));
        let mut stmt = self.conn.prepare(
            r#"SELECT DISTINCT c.id, c.name, c.is_favorite, c.created_time
               FROM contacts c
               LEFT JOIN contact_methods cm ON cm.contact_id = c.id
               WHERE c.name LIKE ?1 ESCAPE '\' OR cm.method_value LIKE ?1 ESCAPE '\'
               ORDER BY c.is_favorite DESC, c.created_time DESC, c.id DESC"#,
        )?;
        let contacts = stmt
            .query_map([pattern], Self::row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let ids: Vec<i64> = contacts.iter().map(|c| c.id).collect();
        let methods = self.methods_for(&ids)?;
        Ok(attach_methods(contacts, methods))
    }

    pub fn stats(&self) -> Result<ContactStats> {
        let count = |sql: &str| -> rusqlite::Result<i64> {
            self.conn.query_row(sql, [], |row| row.get(0))
        };

        Ok(ContactStats {
            total_contacts: count("SELECT COUNT(*) FROM contacts")?,
            favorite_contacts: count("SELECT COUNT(*) FROM contacts WHERE is_favorite = 1")?,
            contacts_with_phone: count(
                "SELECT COUNT(DISTINCT contact_id) FROM contact_methods WHERE method_type = 'phone'",
            )?,
            contacts_with_email: count(
                "SELECT COUNT(DISTINCT contact_id) FROM contact_methods WHERE method_type = 'email'",
            )?,
        })
    }

    // ==================== UPDATE ====================

    /// Full update: optional rename plus wholesale replacement of the method
    /// set (old methods deleted, new set inserted). Unknown ids are a silent
    /// no-op, matching the legacy API behavior.
    pub fn update_contact(
        &self,
        id: i64,
        name: Option<&str>,
        methods: &[MethodInput],
    ) -> Result<()> {
        if self.get_contact(id)?.is_none() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        if let Some(name) = name {
            let name = name.trim();
            if !name.is_empty() {
                tx.execute("UPDATE contacts SET name = ? WHERE id = ?", params![name, id])?;
            }
        }

        tx.execute("DELETE FROM contact_methods WHERE contact_id = ?", [id])?;
        for method in methods {
            if let Some((method_type, value)) = method.well_formed() {
                tx.execute(
                    "INSERT INTO contact_methods (contact_id, method_type, method_value) VALUES (?, ?, ?)",
                    params![id, method_type, value],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Flip the favorite flag in place (`NOT is_favorite`, a true negation,
    /// not an idempotent set). Returns the updated contact.
    pub fn toggle_favorite(&self, id: i64) -> Result<Contact> {
        let affected = self.conn.execute(
            "UPDATE contacts SET is_favorite = NOT is_favorite WHERE id = ?",
            [id],
        )?;
        if affected == 0 {
            return Err(Error::NotFound(id));
        }
        self.get_contact(id)?.ok_or(Error::NotFound(id))
    }

    // ==================== DELETE ====================

    /// Delete a contact; the cascade removes its methods at the storage layer.
    pub fn delete_contact(&self, id: i64) -> Result<()> {
        let affected = self.conn.execute("DELETE FROM contacts WHERE id = ?", [id])?;
        if affected == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    // ==================== METHOD FETCHES ====================

    pub(crate) fn all_methods(&self) -> Result<Vec<ContactMethod>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, method_type, method_value FROM contact_methods
             ORDER BY contact_id, method_type, id",
        )?;
        let methods = stmt
            .query_map([], Self::row_to_method)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(methods)
    }

    pub fn methods_for_contact(&self, contact_id: i64) -> Result<Vec<ContactMethod>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, method_type, method_value FROM contact_methods
             WHERE contact_id = ?
             ORDER BY method_type, id",
        )?;
        let methods = stmt
            .query_map([contact_id], Self::row_to_method)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(methods)
    }

    fn methods_for(&self, contact_ids: &[i64]) -> Result<Vec<ContactMethod>> {
        if contact_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Build IN clause with placeholders
        let placeholders: Vec<&str> = contact_ids.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT id, contact_id, method_type, method_value FROM contact_methods
             WHERE contact_id IN ({})
             ORDER BY contact_id, method_type, id",
            placeholders.join(", ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let methods = stmt
            .query_map(rusqlite::params_from_iter(contact_ids.iter()), Self::row_to_method)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(methods)
    }

    pub(crate) fn all_contacts_by_id(&self) -> Result<Vec<Contact>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, is_favorite, created_time FROM contacts ORDER BY id")?;
        let contacts = stmt
            .query_map([], Self::row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contacts)
    }

    // ==================== ROW MAPPERS ====================

    fn row_to_contact(row: &Row) -> rusqlite::Result<Contact> {
        let created_time: String = row.get("created_time")?;

        Ok(Contact {
            id: row.get("id")?,
            name: row.get("name")?,
            is_favorite: row.get::<_, i32>("is_favorite")? == 1,
            created_time: chrono::DateTime::parse_from_rfc3339(&created_time)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_method(row: &Row) -> rusqlite::Result<ContactMethod> {
        Ok(ContactMethod {
            id: row.get("id")?,
            contact_id: row.get("contact_id")?,
            method_type: row.get("method_type")?,
            method_value: row.get("method_value")?,
        })
    }
}

/// Group child methods by owning contact id and attach them to the parents,
/// preserving the parents' order. Contacts without methods get an empty list.
pub fn attach_methods(
    contacts: Vec<Contact>,
    methods: Vec<ContactMethod>,
) -> Vec<ContactWithMethods> {
    let mut by_contact: HashMap<i64, Vec<MethodEntry>> = HashMap::new();
    for method in methods {
        by_contact
            .entry(method.contact_id)
            .or_default()
            .push(MethodEntry::new(method.method_type, method.method_value));
    }

    contacts
        .into_iter()
        .map(|contact| {
            let methods = by_contact.remove(&contact.id).unwrap_or_default();
            ContactWithMethods::new(contact, methods)
        })
        .collect()
}

/// Escape LIKE metacharacters (% _ \)
fn escape_like(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(method_type: &str, value: &str) -> MethodInput {
        MethodInput {
            method_type: Some(method_type.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_add_and_get_contact() {
        let db = Database::open_memory().unwrap();
        let contact = db
            .add_contact("张三", false, &[method("phone", "13800138000")])
            .unwrap();

        let fetched = db.get_contact(contact.id).unwrap().unwrap();
        assert_eq!(fetched.name, "张三");
        assert!(!fetched.is_favorite);

        let methods = db.methods_for_contact(contact.id).unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].method_type, "phone");
        assert_eq!(methods[0].method_value, "13800138000");
    }

    #[test]
    fn test_add_contact_requires_name() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(
            db.add_contact("", false, &[]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.add_contact("   ", false, &[]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_methods_are_dropped() {
        let db = Database::open_memory().unwrap();
        let inputs = vec![
            method("phone", "555-1234"),
            MethodInput {
                method_type: None,
                value: Some("ignored".into()),
            },
            MethodInput {
                method_type: Some("email".into()),
                value: None,
            },
        ];
        let contact = db.add_contact("Ada", false, &inputs).unwrap();
        assert_eq!(db.methods_for_contact(contact.id).unwrap().len(), 1);
    }

    #[test]
    fn test_list_orders_favorites_then_newest() {
        let db = Database::open_memory().unwrap();
        let oldest = db.add_contact("oldest", false, &[]).unwrap();
        let favorite = db.add_contact("favorite", true, &[]).unwrap();
        let newest = db.add_contact("newest", false, &[]).unwrap();

        let listed = db.list_contacts().unwrap();
        let ids: Vec<i64> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![favorite.id, newest.id, oldest.id]);
    }

    #[test]
    fn test_list_attaches_full_method_sets() {
        let db = Database::open_memory().unwrap();
        let with_methods = db
            .add_contact(
                "Li Si",
                false,
                &[method("phone", "111"), method("phone", "222"), method("email", "a@b.com")],
            )
            .unwrap();
        let bare = db.add_contact("bare", false, &[]).unwrap();

        let listed = db.list_contacts().unwrap();
        let li = listed.iter().find(|c| c.id == with_methods.id).unwrap();
        assert_eq!(li.methods.len(), 3);
        let b = listed.iter().find(|c| c.id == bare.id).unwrap();
        assert!(b.methods.is_empty());
    }

    #[test]
    fn test_delete_cascades_to_methods() {
        let db = Database::open_memory().unwrap();
        let contact = db
            .add_contact("Ada", false, &[method("phone", "111"), method("email", "a@b.com")])
            .unwrap();
        assert_eq!(db.methods_for_contact(contact.id).unwrap().len(), 2);

        db.delete_contact(contact.id).unwrap();
        assert!(db.get_contact(contact.id).unwrap().is_none());
        assert!(db.methods_for_contact(contact.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_contact_reports_not_found() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(db.delete_contact(42), Err(Error::NotFound(42))));
    }

    #[test]
    fn test_toggle_favorite_twice_restores_state() {
        let db = Database::open_memory().unwrap();
        let contact = db.add_contact("Ada", false, &[]).unwrap();

        let toggled = db.toggle_favorite(contact.id).unwrap();
        assert!(toggled.is_favorite);
        let toggled = db.toggle_favorite(contact.id).unwrap();
        assert!(!toggled.is_favorite);
    }

    #[test]
    fn test_toggle_favorite_missing_contact() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(db.toggle_favorite(9), Err(Error::NotFound(9))));
    }

    #[test]
    fn test_update_replaces_method_set() {
        let db = Database::open_memory().unwrap();
        let contact = db
            .add_contact("Ada", false, &[method("phone", "111"), method("phone", "222")])
            .unwrap();

        db.update_contact(
            contact.id,
            Some("Ada Lovelace"),
            &[method("email", "ada@example.com")],
        )
        .unwrap();

        let updated = db.get_contact(contact.id).unwrap().unwrap();
        assert_eq!(updated.name, "Ada Lovelace");
        let methods = db.methods_for_contact(contact.id).unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].method_type, "email");
    }

    #[test]
    fn test_update_with_empty_methods_clears_all() {
        let db = Database::open_memory().unwrap();
        let contact = db
            .add_contact("Ada", false, &[method("phone", "111")])
            .unwrap();

        db.update_contact(contact.id, None, &[]).unwrap();
        assert!(db.methods_for_contact(contact.id).unwrap().is_empty());
        // Name untouched when not supplied
        assert_eq!(db.get_contact(contact.id).unwrap().unwrap().name, "Ada");
    }

    #[test]
    fn test_update_unknown_id_is_silent_noop() {
        let db = Database::open_memory().unwrap();
        db.update_contact(123, Some("ghost"), &[method("phone", "111")])
            .unwrap();
        assert!(db.get_contact(123).unwrap().is_none());
    }

    #[test]
    fn test_search_matches_name_and_method_values() {
        let db = Database::open_memory().unwrap();
        let by_name = db.add_contact("Zhang San", false, &[]).unwrap();
        let by_phone = db
            .add_contact("Li Si", false, &[method("phone", "138-0013-8000")])
            .unwrap();
        db.add_contact("unrelated", false, &[]).unwrap();

        let results = db.search_contacts("zhang").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, by_name.id);

        let results = db.search_contacts("0013").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, by_phone.id);
    }

    #[test]
    fn test_search_returns_distinct_contacts_with_methods() {
        let db = Database::open_memory().unwrap();
        // Two matching methods must not duplicate the parent.
        let contact = db
            .add_contact("Ada", false, &[method("phone", "555-1111"), method("phone", "555-2222")])
            .unwrap();

        let results = db.search_contacts("555").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, contact.id);
        assert_eq!(results[0].methods.len(), 2);
    }

    #[test]
    fn test_search_empty_keyword_matches_everything() {
        let db = Database::open_memory().unwrap();
        db.add_contact("a", false, &[]).unwrap();
        db.add_contact("b", true, &[]).unwrap();

        assert_eq!(db.search_contacts("").unwrap().len(), 2);
    }

    #[test]
    fn test_search_escapes_like_wildcards() {
        let db = Database::open_memory().unwrap();
        db.add_contact("100% cotton", false, &[]).unwrap();
        db.add_contact("percent-free", false, &[]).unwrap();

        let results = db.search_contacts("100%").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "100% cotton");
    }

    #[test]
    fn test_favorites_listing() {
        let db = Database::open_memory().unwrap();
        db.add_contact("plain", false, &[]).unwrap();
        let fav = db
            .add_contact("starred", true, &[method("email", "s@x.com")])
            .unwrap();

        let favorites = db.list_favorites().unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, fav.id);
        assert_eq!(favorites[0].methods.len(), 1);
    }

    #[test]
    fn test_stats_counts_distinct_contacts() {
        let db = Database::open_memory().unwrap();
        db.add_contact("two phones", true, &[method("phone", "1"), method("phone", "2")])
            .unwrap();
        db.add_contact("email only", false, &[method("email", "e@x.com")])
            .unwrap();
        db.add_contact("nothing", false, &[]).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_contacts, 3);
        assert_eq!(stats.favorite_contacts, 1);
        assert_eq!(stats.contacts_with_phone, 1);
        assert_eq!(stats.contacts_with_email, 1);
    }

    #[test]
    fn test_attach_methods_groups_by_owner() {
        let contacts = vec![
            Contact {
                id: 1,
                name: "a".into(),
                is_favorite: false,
                created_time: Utc::now(),
            },
            Contact {
                id: 2,
                name: "b".into(),
                is_favorite: false,
                created_time: Utc::now(),
            },
        ];
        let methods = vec![
            ContactMethod {
                id: 10,
                contact_id: 2,
                method_type: "phone".into(),
                method_value: "111".into(),
            },
            ContactMethod {
                id: 11,
                contact_id: 2,
                method_type: "email".into(),
                method_value: "b@x.com".into(),
            },
        ];

        let attached = attach_methods(contacts, methods);
        assert!(attached[0].methods.is_empty());
        assert_eq!(attached[1].methods.len(), 2);
        assert_eq!(attached[1].methods[0].value, "111");
    }
}
