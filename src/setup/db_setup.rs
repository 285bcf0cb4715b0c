use redb::{CommitError, Database, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

use crate::models::db_operations::records_db_operations;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

/// Creates the SQLite side: form settings, platform accounts, taxonomy, the
/// media ledger and the optional view-count table.
pub fn setup_platform_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;

    println!("- Creating 'submission_forms' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS submission_forms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL UNIQUE CHECK(length(title) <= 200),
            data TEXT NOT NULL
        )",
        [],
    )?;

    println!("- Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'member'))
        )",
        [],
    )?;

    println!("- Creating 'categories' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    println!("- Creating 'tags' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            name TEXT PRIMARY KEY
        )",
        [],
    )?;

    println!("- Creating 'media_attachments' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS media_attachments (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            file_name TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    println!("- Creating 'post_views' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS post_views (
            post_id TEXT PRIMARY KEY,
            views INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    tx.commit()?;
    Ok(())
}

/// Creates the redb side: content records and their metadata tables.
pub fn setup_records_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        println!("- Creating 'records' table in Redb...");
        write_txn.open_table(records_db_operations::RECORDS)?;

        println!("- Creating 'record_metadata' table in Redb...");
        write_txn.open_table(records_db_operations::RECORD_METADATA)?;

        println!("- Creating 'author_info' table in Redb...");
        write_txn.open_table(records_db_operations::AUTHOR_INFO)?;

        println!("- Creating 'custom_fields' table in Redb...");
        write_txn.open_table(records_db_operations::CUSTOM_FIELDS)?;

        println!("- Creating 'media_index' table in Redb...");
        write_txn.open_table(records_db_operations::MEDIA_INDEX)?;

        println!("- Creating 'title_index' table in Redb...");
        write_txn.open_multimap_table(records_db_operations::TITLE_INDEX)?;
    }
    write_txn.commit()?;
    Ok(())
}
