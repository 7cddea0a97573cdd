use anyhow::Result;
use std::path::Path;

use crate::db::Database;

/// Print aggregate contact counts.
pub fn run_stats(db_path: &Path) -> Result<()> {
    let db = Database::open_at(db_path.to_path_buf())?;
    let stats = db.stats()?;

    println!("Contacts:    {}", stats.total_contacts);
    println!("Favorites:   {}", stats.favorite_contacts);
    println!("With phone:  {}", stats.contacts_with_phone);
    println!("With email:  {}", stats.contacts_with_email);

    Ok(())
}
