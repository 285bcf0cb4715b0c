use rusqlite::{params, Connection, OptionalExtension, Result as RusqliteResult};

use crate::models::Account;

// Platform accounts are owned by the host's authentication stack. This
// service only reads them: author resolution, recipient fallback, and the
// author picker in the form builder.

fn account_from_row(row: &rusqlite::Row) -> RusqliteResult<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        role: row.get(4)?,
    })
}

pub fn read_account_by_id(conn: &Connection, account_id: i64) -> Option<Account> {
    conn.query_row(
        "SELECT id, username, display_name, email, role FROM users WHERE id = ?1",
        [account_id],
        account_from_row,
    ).ok()
}

pub fn read_account_by_username(conn: &Connection, username: &str) -> Option<Account> {
    conn.query_row(
        "SELECT id, username, display_name, email, role FROM users WHERE username = ?1",
        [username],
        account_from_row,
    ).ok()
}

pub fn account_exists(conn: &Connection, account_id: i64) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [account_id],
        |row| row.get(0),
    ).unwrap_or(false)
}

pub fn read_all_accounts(conn: &Connection) -> RusqliteResult<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, display_name, email, role FROM users ORDER BY display_name"
    )?;
    let rows = stmt.query_map([], account_from_row)?;
    rows.collect()
}

pub fn create_account(
    conn: &Connection,
    username: &str,
    display_name: &str,
    email: &str,
    role: &str,
) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO users (username, display_name, email, role) VALUES (?1, ?2, ?3, ?4)",
        params![username, display_name, email, role],
    )?;
    Ok(conn.last_insert_rowid())
}

// --- Media ledger ---
//
// Every asset produced by a submission (inline image or featured upload) is
// recorded here so ownership and containment can be resolved later.

pub fn add_media_attachment(
    conn: &Connection,
    id: &str,
    user_id: i64,
    file_name: &str,
) -> RusqliteResult<()> {
    conn.execute(
        "INSERT INTO media_attachments (id, user_id, file_name) VALUES (?1, ?2, ?3)",
        params![id, user_id, file_name],
    )?;
    Ok(())
}

pub fn delete_media_attachment(conn: &Connection, id: &str) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM media_attachments WHERE id = ?1", [id])
}

pub fn media_file_name(conn: &Connection, id: &str) -> Option<String> {
    conn.query_row("SELECT file_name FROM media_attachments WHERE id = ?1", [id], |row| row.get(0))
        .optional()
        .unwrap_or(None)
}

// --- View counts ---

/// Reads the view count maintained by the host's counter, if any. Callers
/// decide whether the collaborator is installed at all.
pub fn read_post_views(conn: &Connection, post_id: &str) -> u64 {
    conn.query_row("SELECT views FROM post_views WHERE post_id = ?1", [post_id], |row| row.get(0))
        .optional()
        .unwrap_or(None)
        .unwrap_or(0)
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
    fn account_lookup_by_id_and_username() {
        let conn = test_conn();
        let id = create_account(&conn, "maria", "Maria Lopez", "maria@example.org", "member").unwrap();

        let by_id = read_account_by_id(&conn, id).unwrap();
        assert_eq!(by_id.username, "maria");
        let by_name = read_account_by_username(&conn, "maria").unwrap();
        assert_eq!(by_name.id, id);
        assert!(account_exists(&conn, id));
        assert!(!account_exists(&conn, id + 1));
    }

    #[test]
    fn media_ledger_insert_and_delete() {
        let conn = test_conn();
        let user = create_account(&conn, "sam", "Sam", "sam@example.org", "member").unwrap();
        add_media_attachment(&conn, "abc123", user, "post-abc123.png").unwrap();
        assert_eq!(media_file_name(&conn, "abc123").unwrap(), "post-abc123.png");
        assert_eq!(delete_media_attachment(&conn, "abc123").unwrap(), 1);
        assert!(media_file_name(&conn, "abc123").is_none());
    }

    #[test]
    fn missing_view_count_reads_as_zero() {
        let conn = test_conn();
        assert_eq!(read_post_views(&conn, "nope"), 0);
        conn.execute("INSERT INTO post_views (post_id, views) VALUES ('p1', 42)", []).unwrap();
        assert_eq!(read_post_views(&conn, "p1"), 42);
    }
}
