use redb::{
    CommitError, Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    StorageError, TableDefinition, TableError, TransactionError,
};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuthorInfo, CustomFieldValue, PostStatus, RecordMetadata, RecordSummary, StoredRecord,
};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("The title already exists.")]
    TitleExists,
}

// Content records live entirely in redb. The body and each metadata block are
// separate tables keyed by the record UUID; the title index serializes the
// uniqueness check with the write that depends on it.
pub const RECORDS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("records");
pub const RECORD_METADATA: TableDefinition<&[u8; 16], &str> = TableDefinition::new("record_metadata");
pub const AUTHOR_INFO: TableDefinition<&[u8; 16], &str> = TableDefinition::new("author_info");
pub const CUSTOM_FIELDS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("custom_fields");
pub const MEDIA_INDEX: TableDefinition<&[u8; 16], &str> = TableDefinition::new("media_index");
pub const TITLE_INDEX: MultimapTableDefinition<&str, &[u8; 16]> = MultimapTableDefinition::new("title_index");

/// Everything a single submission writes, committed in one transaction.
pub struct RecordWrite {
    pub content: String,
    pub meta: RecordMetadata,
    pub author_info: AuthorInfo,
    pub custom_fields: Vec<CustomFieldValue>,
    pub media_ids: Vec<String>,
    pub enforce_unique_title: bool,
}

fn normalized_title(title: &str) -> String {
    title.trim().to_string()
}

fn title_taken_by_other(
    table: &impl ReadableMultimapTable<&'static str, &'static [u8; 16]>,
    title: &str,
    exclude: Option<&[u8; 16]>,
) -> Result<bool, DbError> {
    if title.is_empty() {
        return Ok(false);
    }
    let mut values = table.get(title)?;
    while let Some(guard) = values.next() {
        let id_bytes = *guard?.value();
        if Some(&id_bytes) != exclude {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn create_record(db: &Database, write: &RecordWrite) -> Result<String, DbError> {
    let record_uuid = Uuid::new_v4();
    let id_bytes = record_uuid.into_bytes();
    let title_key = normalized_title(&write.meta.title);

    let write_txn = db.begin_write()?;
    {
        let mut records_table = write_txn.open_table(RECORDS)?;
        let mut metadata_table = write_txn.open_table(RECORD_METADATA)?;
        let mut author_info_table = write_txn.open_table(AUTHOR_INFO)?;
        let mut custom_fields_table = write_txn.open_table(CUSTOM_FIELDS)?;
        let mut media_index_table = write_txn.open_table(MEDIA_INDEX)?;
        let mut title_index = write_txn.open_multimap_table(TITLE_INDEX)?;

        // Authoritative uniqueness check: inside the write transaction, so a
        // concurrent identical title cannot slip between check and insert.
        if write.enforce_unique_title && title_taken_by_other(&title_index, &title_key, None)? {
            return Err(DbError::TitleExists);
        }

        let metadata_json = serde_json::to_string(&write.meta)?;
        let author_info_json = serde_json::to_string(&write.author_info)?;
        let custom_fields_json = serde_json::to_string(&write.custom_fields)?;
        let media_json = serde_json::to_string(&write.media_ids)?;

        records_table.insert(&id_bytes, write.content.as_str())?;
        metadata_table.insert(&id_bytes, metadata_json.as_str())?;
        author_info_table.insert(&id_bytes, author_info_json.as_str())?;
        custom_fields_table.insert(&id_bytes, custom_fields_json.as_str())?;
        media_index_table.insert(&id_bytes, media_json.as_str())?;
        if !title_key.is_empty() {
            title_index.insert(title_key.as_str(), &id_bytes)?;
        }
    }
    write_txn.commit()?;

    Ok(record_uuid.to_string())
}

/// Rewrites an existing record and returns its previous status so callers can
/// detect publication transitions. The creation timestamp is preserved; media
/// ids accumulate across edits.
pub fn update_record(db: &Database, record_id: &str, write: &RecordWrite) -> Result<PostStatus, DbError> {
    let record_uuid = Uuid::parse_str(record_id)?;
    let id_bytes = record_uuid.into_bytes();
    let title_key = normalized_title(&write.meta.title);

    let previous_status;
    let write_txn = db.begin_write()?;
    {
        let mut records_table = write_txn.open_table(RECORDS)?;
        let mut metadata_table = write_txn.open_table(RECORD_METADATA)?;
        let mut author_info_table = write_txn.open_table(AUTHOR_INFO)?;
        let mut custom_fields_table = write_txn.open_table(CUSTOM_FIELDS)?;
        let mut media_index_table = write_txn.open_table(MEDIA_INDEX)?;
        let mut title_index = write_txn.open_multimap_table(TITLE_INDEX)?;

        let old_meta: RecordMetadata = {
            let guard = metadata_table.get(&id_bytes)?
                .ok_or_else(|| DbError::NotFound("Record metadata not found".to_string()))?;
            serde_json::from_str(guard.value())?
        };
        previous_status = old_meta.status;

        if write.enforce_unique_title
            && title_taken_by_other(&title_index, &title_key, Some(&id_bytes))?
        {
            return Err(DbError::TitleExists);
        }

        let old_media: Vec<String> = match media_index_table.get(&id_bytes)? {
            Some(guard) => serde_json::from_str(guard.value())?,
            None => Vec::new(),
        };

        let mut new_meta = write.meta.clone();
        new_meta.created_at = old_meta.created_at;
        new_meta.last_updated_at = Some(Utc::now());

        let mut media_ids = old_media;
        for id in &write.media_ids {
            if !media_ids.contains(id) {
                media_ids.push(id.clone());
            }
        }

        let metadata_json = serde_json::to_string(&new_meta)?;
        let author_info_json = serde_json::to_string(&write.author_info)?;
        let custom_fields_json = serde_json::to_string(&write.custom_fields)?;
        let media_json = serde_json::to_string(&media_ids)?;

        let old_title_key = normalized_title(&old_meta.title);
        if old_title_key != title_key {
            if !old_title_key.is_empty() {
                title_index.remove(old_title_key.as_str(), &id_bytes)?;
            }
            if !title_key.is_empty() {
                title_index.insert(title_key.as_str(), &id_bytes)?;
            }
        }

        records_table.insert(&id_bytes, write.content.as_str())?;
        metadata_table.insert(&id_bytes, metadata_json.as_str())?;
        author_info_table.insert(&id_bytes, author_info_json.as_str())?;
        custom_fields_table.insert(&id_bytes, custom_fields_json.as_str())?;
        media_index_table.insert(&id_bytes, media_json.as_str())?;
    }
    write_txn.commit()?;

    Ok(previous_status)
}

pub fn read_record(db: &Database, record_id: &str) -> Option<StoredRecord> {
    let record_uuid = Uuid::parse_str(record_id).ok()?;
    let id_bytes = record_uuid.into_bytes();

    let read_txn = db.begin_read().ok()?;
    let records_table = read_txn.open_table(RECORDS).ok()?;
    let metadata_table = read_txn.open_table(RECORD_METADATA).ok()?;
    let author_info_table = read_txn.open_table(AUTHOR_INFO).ok()?;
    let custom_fields_table = read_txn.open_table(CUSTOM_FIELDS).ok()?;
    let media_index_table = read_txn.open_table(MEDIA_INDEX).ok()?;

    let content = records_table.get(&id_bytes).ok().flatten()?.value().to_string();
    let meta: RecordMetadata = {
        let guard = metadata_table.get(&id_bytes).ok().flatten()?;
        serde_json::from_str(guard.value()).ok()?
    };
    let author_info = author_info_table.get(&id_bytes).ok().flatten()
        .and_then(|guard| serde_json::from_str(guard.value()).ok());
    let custom_fields = custom_fields_table.get(&id_bytes).ok().flatten()
        .and_then(|guard| serde_json::from_str(guard.value()).ok())
        .unwrap_or_default();
    let media_ids = media_index_table.get(&id_bytes).ok().flatten()
        .and_then(|guard| serde_json::from_str(guard.value()).ok())
        .unwrap_or_default();

    Some(StoredRecord {
        id: record_id.to_string(),
        content,
        meta,
        author_info,
        custom_fields,
        media_ids,
    })
}

/// Advisory pre-check used by the submission validator. The binding check
/// happens again inside the write transaction.
pub fn title_exists(db: &Database, title: &str, exclude_id: Option<&str>) -> Result<bool, DbError> {
    let title_key = normalized_title(title);
    if title_key.is_empty() {
        return Ok(false);
    }

    let exclude_bytes = match exclude_id {
        Some(id) => Some(Uuid::parse_str(id)?.into_bytes()),
        None => None,
    };

    let read_txn = db.begin_read()?;
    let title_index = read_txn.open_multimap_table(TITLE_INDEX)?;
    title_taken_by_other(&title_index, &title_key, exclude_bytes.as_ref())
}

/// Soft delete: the record stays in place with its title still reserved, only
/// the status flips.
pub fn trash_record(db: &Database, record_id: &str) -> Result<(), DbError> {
    let record_uuid = Uuid::parse_str(record_id)?;
    let id_bytes = record_uuid.into_bytes();

    let write_txn = db.begin_write()?;
    {
        let mut metadata_table = write_txn.open_table(RECORD_METADATA)?;
        let mut meta: RecordMetadata = {
            let guard = metadata_table.get(&id_bytes)?
                .ok_or_else(|| DbError::NotFound(record_id.to_string()))?;
            serde_json::from_str(guard.value())?
        };
        meta.status = PostStatus::Trash;
        meta.last_updated_at = Some(Utc::now());
        let metadata_json = serde_json::to_string(&meta)?;
        metadata_table.insert(&id_bytes, metadata_json.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Paginated listing of a user's own submissions, newest first. Trashed and
/// private records are not shown. Returns the page plus the total page count.
pub fn list_records_by_author(
    db: &Database,
    author_id: i64,
    page: u64,
    per_page: u64,
) -> Result<(Vec<RecordSummary>, u64), DbError> {
    let read_txn = db.begin_read()?;
    let metadata_table = read_txn.open_table(RECORD_METADATA)?;
    let records_table = read_txn.open_table(RECORDS)?;

    let mut summaries: Vec<RecordSummary> = metadata_table.iter()?
        .filter_map(|res| res.ok())
        .filter_map(|(id_bytes, meta_str)| {
            let meta: RecordMetadata = serde_json::from_str(meta_str.value()).ok()?;
            if meta.author_id != author_id {
                return None;
            }
            if !matches!(meta.status, PostStatus::Publish | PostStatus::Pending | PostStatus::Draft) {
                return None;
            }
            let record_uuid = Uuid::from_bytes(*id_bytes.value());
            let content = records_table.get(id_bytes.value()).ok().flatten()
                .map(|guard| guard.value().to_string())
                .unwrap_or_default();
            Some(RecordSummary { id: record_uuid.to_string(), meta, content })
        })
        .collect();

    // Sort in memory; per-author volumes are small and there is no dedicated
    // author index to walk.
    summaries.sort_by(|a, b| b.meta.created_at.cmp(&a.meta.created_at));

    let total = summaries.len() as u64;
    let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };
    let page = page.max(1);
    let offset = (page - 1) * per_page;

    let items = summaries
        .into_iter()
        .skip(offset as usize)
        .take(per_page as usize)
        .collect();

    Ok((items, total_pages))
}
