use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult};

use crate::models::FormRow;

/// Inserts a new form settings row and returns its id.
///
/// `data` must already be the serialized output of the schema validator;
/// nothing unvalidated is ever written to this table.
pub fn create_form(conn: &Connection, title: &str, data: &str) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO submission_forms (title, data) VALUES (?1, ?2)",
        params![title, data],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn title_exists(conn: &Connection, title: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM submission_forms WHERE title = ?1)",
        [title],
        |row| row.get(0),
    ).unwrap_or(false)
}

pub fn read_form(conn: &Connection, form_id: i64) -> Option<FormRow> {
    conn.query_row(
        "SELECT id, title, data FROM submission_forms WHERE id = ?1",
        [form_id],
        |row| {
            Ok(FormRow {
                id: row.get(0)?,
                title: row.get(1)?,
                data: row.get(2)?,
            })
        },
    ).ok()
}

pub fn read_all_forms(conn: &Connection) -> RusqliteResult<Vec<FormRow>> {
    let mut stmt = conn.prepare("SELECT id, title, data FROM submission_forms ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(FormRow {
            id: row.get(0)?,
            title: row.get(1)?,
            data: row.get(2)?,
        })
    })?;
    rows.collect()
}

pub fn update_form_data(conn: &Connection, form_id: i64, data: &str) -> RusqliteResult<usize> {
    conn.execute(
        "UPDATE submission_forms SET data = ?1 WHERE id = ?2",
        params![data, form_id],
    )
}

pub fn delete_form(conn: &Connection, form_id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM submission_forms WHERE id = ?1", [form_id])
}

/// Bulk import used by the settings restore flow. Rows keep their original
/// ids; ids that already exist are left untouched.
pub fn restore_forms(conn: &mut Connection, rows: &[(i64, String, String)]) -> RusqliteResult<()> {
    let tx = conn.transaction()?;
    for (id, title, data) in rows {
        tx.execute(
            "INSERT OR IGNORE INTO submission_forms (id, title, data) VALUES (?1, ?2, ?3)",
            params![id, title, data],
        )?;
    }
    tx.commit()
}

// --- Taxonomy ---
//
// Categories are referenced by id, tags by name, mirroring how the two
// taxonomies behave at submission time.

pub fn category_exists(conn: &Connection, category_id: i64) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        [category_id],
        |row| row.get(0),
    ).unwrap_or(false)
}

pub fn category_name(conn: &Connection, category_id: i64) -> Option<String> {
    conn.query_row("SELECT name FROM categories WHERE id = ?1", [category_id], |row| row.get(0))
        .optional()
        .unwrap_or(None)
}

pub fn tag_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tags WHERE name = ?1)",
        [name],
        |row| row.get(0),
    ).unwrap_or(false)
}

pub fn insert_tag(conn: &Connection, name: &str) -> RusqliteResult<()> {
    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
    Ok(())
}

pub fn insert_category(conn: &Connection, name: &str) -> RusqliteResult<i64> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
    Ok(conn.last_insert_rowid())
}

/// Category list offered to clients, with the schema's exclusions applied.
pub fn list_categories(conn: &Connection, exclude_ids: &[i64]) -> RusqliteResult<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
    let mut categories = Vec::new();
    for row in rows {
        let (id, name) = row?;
        if !exclude_ids.contains(&id) {
            categories.push((id, name));
        }
    }
    Ok(categories)
}

/// Tag list offered to clients, with the schema's exclusions applied.
pub fn list_tags(conn: &Connection, exclude: &[String]) -> RusqliteResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut tags = Vec::new();
    for row in rows {
        let name = row?;
        if !exclude.iter().any(|e| e == &name) {
            tags.push(name);
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_platform_db(&mut conn).unwrap();
        conn
    }

    #[test]
    fn create_and_read_form_round_trips() {
        let conn = test_conn();
        let id = create_form(&conn, "Guest submissions", "{\"a\":1}").unwrap();
        let row = read_form(&conn, id).unwrap();
        assert_eq!(row.title, "Guest submissions");
        assert_eq!(row.data, "{\"a\":1}");
        assert!(title_exists(&conn, "Guest submissions"));
        assert!(!title_exists(&conn, "Other"));
    }

    #[test]
    fn restore_skips_existing_ids() {
        let mut conn = test_conn();
        let id = create_form(&conn, "Original", "{}").unwrap();
        restore_forms(&mut conn, &[
            (id, "Clobbered".to_string(), "{\"x\":true}".to_string()),
            (id + 7, "Imported".to_string(), "{}".to_string()),
        ]).unwrap();

        assert_eq!(read_form(&conn, id).unwrap().title, "Original");
        assert_eq!(read_form(&conn, id + 7).unwrap().title, "Imported");
    }

    #[test]
    fn taxonomy_listing_honors_exclusions() {
        let conn = test_conn();
        let news = insert_category(&conn, "News").unwrap();
        insert_category(&conn, "Opinion").unwrap();
        insert_tag(&conn, "rust").unwrap();
        insert_tag(&conn, "hidden").unwrap();

        let categories = list_categories(&conn, &[news]).unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].1, "Opinion");

        let tags = list_tags(&conn, &["hidden".to_string()]).unwrap();
        assert_eq!(tags, vec!["rust".to_string()]);
    }
}
