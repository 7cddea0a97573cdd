/// Normalized contact-book schema. Creation is idempotent: applying it to a
/// database that already has both tables is a no-op.
pub const SCHEMA: &str = r#"
-- Core contact table
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_time TEXT NOT NULL
);

-- One row per way of reaching a contact (phone, email, address, social, ...)
CREATE TABLE IF NOT EXISTS contact_methods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contact_id INTEGER NOT NULL,
    method_type TEXT NOT NULL,
    method_value TEXT NOT NULL,
    FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_method_contact ON contact_methods(contact_id);
CREATE INDEX IF NOT EXISTS idx_method_type ON contact_methods(method_type);
"#;
