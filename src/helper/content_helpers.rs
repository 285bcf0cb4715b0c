use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use redb::Database;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::helper::sanitization_helpers::{sanitize_rich_html, strip_all_html};
use crate::models::db_operations::records_db_operations::{self, DbError, RecordWrite};
use crate::models::db_operations::{forms_db_operations, users_db_operations};
use crate::models::{
    AuthorInfo, FieldMode, FormSchema, PostStatus, RecordMetadata, StoredRecord,
    SubmissionListItem, ValidatedSubmission,
};

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Failed to process some images in the content. Please make sure you are using supported image file types and try again.")]
    InlineImage,
    #[error("There was an error uploading the file. Please try again.")]
    FeaturedUpload,
    #[error("The title already exists.")]
    TitleExists,
    #[error("Failed to save the post. Please try again or contact the site operator.")]
    Persist(#[source] DbError),
}

/// One base64 image embedded in a submission body.
pub struct InlineImage {
    /// Declared image type, lowercased (`png`, `jpeg`, `svg+xml`, ...).
    pub extension: String,
    /// The full `<img>` tag as it appears in the body.
    pub tag: String,
    /// The raw base64 payload.
    pub payload: String,
}

pub fn count_img_tags(content: &str) -> usize {
    Regex::new(r"(?i)<img[^>]+>").unwrap().find_iter(content).count()
}

pub fn scan_inline_images(content: &str) -> Vec<InlineImage> {
    let inline_re =
        Regex::new(r#"(?i)<img[^>]*src="data:image/([a-zA-Z0-9+]+);base64,([^"]+)"[^>]*>"#)
            .unwrap();
    inline_re
        .captures_iter(content)
        .map(|caps| InlineImage {
            extension: caps[1].to_ascii_lowercase(),
            tag: caps[0].to_string(),
            payload: caps[2].to_string(),
        })
        .collect()
}

/// Filename prefix derived from the title: non-alphanumerics collapse to
/// dashes, capped at 20 characters, current date when the title is empty.
fn slugify_title(title: &str) -> String {
    let collapsed = Regex::new(r"[^a-zA-Z0-9]+")
        .unwrap()
        .replace_all(title.trim(), "-")
        .to_string();
    let trimmed = collapsed.trim_matches('-');
    let base = if trimmed.is_empty() {
        Utc::now().format("%Y-%m-%d").to_string()
    } else {
        trimmed.to_string()
    };
    base.chars().take(20).collect()
}

struct PersistedAsset {
    id: String,
    file_name: String,
    path: PathBuf,
}

/// Writes one decoded image under the uploads directory and records it in the
/// media ledger. Returns None on any failure; the caller aborts and cleans up.
fn persist_media_asset(
    config: &Config,
    conn: &Connection,
    owner_id: i64,
    title: &str,
    extension: &str,
    payload: &str,
) -> Option<PersistedAsset> {
    let bytes = match BASE64.decode(payload.trim().as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Rejecting media asset with undecodable payload: {}", e);
            return None;
        }
    };

    let extension = match extension {
        "jpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    let media_id = Uuid::new_v4().simple().to_string();
    let file_name = format!("{}-{}.{}", slugify_title(title), media_id, extension);

    let uploads_dir = config.uploads_dir();
    if let Err(e) = fs::create_dir_all(&uploads_dir) {
        log::error!("Failed to create uploads directory: {}", e);
        return None;
    }
    let path = uploads_dir.join(&file_name);
    if let Err(e) = fs::write(&path, &bytes) {
        log::error!("Failed to write media asset {}: {}", file_name, e);
        return None;
    }
    if let Err(e) = users_db_operations::add_media_attachment(conn, &media_id, owner_id, &file_name) {
        log::error!("Failed to record media asset {} in the ledger: {}", media_id, e);
        let _ = fs::remove_file(&path);
        return None;
    }

    Some(PersistedAsset { id: media_id, file_name, path })
}

/// Removes assets written earlier in a request whose later steps failed.
/// Cleanup failures are logged, never escalated.
fn discard_assets(conn: &Connection, assets: &[PersistedAsset]) {
    for asset in assets {
        if let Err(e) = fs::remove_file(&asset.path) {
            log::warn!("Failed to remove orphaned media file {}: {}", asset.file_name, e);
        }
        if let Err(e) = users_db_operations::delete_media_attachment(conn, &asset.id) {
            log::warn!("Failed to remove orphaned media ledger row {}: {}", asset.id, e);
        }
    }
}

/// Explicit selections are filtered against the taxonomy; unknown ids are
/// silently dropped. No selection at all falls back to the auto-assign list.
fn filter_categories(conn: &Connection, selected: &[i64], schema: &FormSchema) -> Vec<i64> {
    if selected.is_empty() {
        return schema.fields.categories.auto_assign_ids.clone();
    }
    selected
        .iter()
        .copied()
        .filter(|id| forms_db_operations::category_exists(conn, *id))
        .collect()
}

/// Returns the tags to store plus the subset that does not exist yet (only
/// populated when the schema allows creating new tags).
fn filter_tags(conn: &Connection, selected: &[String], schema: &FormSchema) -> (Vec<String>, Vec<String>) {
    if selected.is_empty() {
        return (schema.fields.tags.auto_assign.clone(), Vec::new());
    }
    if !schema.fields.tags.allow_new {
        let known = selected
            .iter()
            .filter(|name| forms_db_operations::tag_exists(conn, name))
            .cloned()
            .collect();
        return (known, Vec::new());
    }
    let new_tags = selected
        .iter()
        .filter(|name| !forms_db_operations::tag_exists(conn, name))
        .cloned()
        .collect();
    (selected.to_vec(), new_tags)
}

#[derive(Debug)]
pub struct MaterializedRecord {
    pub record_id: String,
    pub permalink: String,
    pub status: PostStatus,
    /// Status before this write; None for a freshly created record.
    pub previous_status: Option<PostStatus>,
    pub title: String,
}

/// Turns a validated submission into a persisted content record with its
/// side effects.
///
/// Media assets are persisted and the body rewritten before anything touches
/// the record store; the record itself commits in a single transaction. Any
/// asset failure aborts the whole submission and removes the assets already
/// written for this request.
pub fn materialize(
    config: &Config,
    conn: &Connection,
    records: &Database,
    schema: &FormSchema,
    form_id: i64,
    submission: &ValidatedSubmission,
    existing: Option<&StoredRecord>,
) -> Result<MaterializedRecord, MaterializeError> {
    // Disabled fields keep the previous record's values across edits.
    let title = if schema.fields.post_title == FieldMode::Disable {
        existing
            .map(|record| record.meta.title.clone())
            .unwrap_or_else(|| submission.title.clone())
    } else {
        submission.title.clone()
    };
    let excerpt = if schema.fields.excerpt == FieldMode::Disable {
        existing
            .map(|record| record.meta.excerpt.clone())
            .unwrap_or_else(|| submission.excerpt.clone())
    } else {
        submission.excerpt.clone()
    };

    let mut assets: Vec<PersistedAsset> = Vec::new();
    let mut content = submission.content.clone();
    for image in scan_inline_images(&submission.content) {
        match persist_media_asset(
            config,
            conn,
            submission.author_id,
            &title,
            &image.extension,
            &image.payload,
        ) {
            Some(asset) => {
                let img_tag = format!(
                    "<img class=\"alignnone size-full\" src=\"{}\" alt=\"\" />",
                    config.media_url(&asset.file_name)
                );
                content = content.replacen(&image.tag, &img_tag, 1);
                assets.push(asset);
            }
            None => {
                discard_assets(conn, &assets);
                return Err(MaterializeError::InlineImage);
            }
        }
    }
    let content = sanitize_rich_html(&content);

    // Featured media: explicit removal, explicit replacement, or the schema
    // default when the record would otherwise end up with none.
    let current_featured = existing.and_then(|record| record.meta.featured_media.clone());
    let featured_media = if submission.remove_featured_image {
        None
    } else if let Some(upload) = &submission.featured_image {
        let extension = upload
            .file_name
            .rsplit('.')
            .next()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match persist_media_asset(
            config,
            conn,
            submission.author_id,
            &title,
            &extension,
            &upload.data,
        ) {
            Some(asset) => {
                let media_id = asset.id.clone();
                assets.push(asset);
                Some(media_id)
            }
            None => {
                discard_assets(conn, &assets);
                return Err(MaterializeError::FeaturedUpload);
            }
        }
    } else if current_featured.is_some() {
        current_featured
    } else if !schema.fields.featured_image.default_media_id.is_empty() {
        Some(schema.fields.featured_image.default_media_id.clone())
    } else {
        None
    };

    let categories = filter_categories(conn, &submission.categories, schema);
    let (tags, new_tags) = filter_tags(conn, &submission.tags, schema);

    // Submitted custom-field values are skipped individually, unlike the
    // schema's custom-field descriptors which reject as a whole. Kept as-is.
    let custom_fields = submission
        .custom_fields
        .iter()
        .filter(|field| {
            !field.name.is_empty()
                && !field.label.is_empty()
                && !field.field_type.is_empty()
                && !field.content.is_empty()
        })
        .cloned()
        .collect();

    // Field-level merge: disabled identity fields retain the stored values.
    let old_info = existing
        .and_then(|record| record.author_info.clone())
        .unwrap_or_default();
    let author_info = AuthorInfo {
        user_name: if schema.fields.user_name == FieldMode::Disable {
            old_info.user_name
        } else {
            submission.user_name.clone()
        },
        user_email: if schema.fields.user_email == FieldMode::Disable {
            old_info.user_email
        } else {
            submission.user_email.clone()
        },
    };

    let status = schema.general.target_status();
    let write = RecordWrite {
        content,
        meta: RecordMetadata {
            title: title.clone(),
            excerpt,
            status,
            author_id: submission.author_id,
            created_at: Utc::now(),
            last_updated_at: None,
            categories,
            tags,
            featured_media,
            form_id,
        },
        author_info,
        custom_fields,
        media_ids: assets.iter().map(|asset| asset.id.clone()).collect(),
        enforce_unique_title: schema.general.unique_title,
    };

    let written = match existing {
        Some(record) => records_db_operations::update_record(records, &record.id, &write)
            .map(|previous| (record.id.clone(), Some(previous))),
        None => records_db_operations::create_record(records, &write).map(|id| (id, None)),
    };

    let (record_id, previous_status) = match written {
        Ok(pair) => pair,
        Err(DbError::TitleExists) => {
            discard_assets(conn, &assets);
            return Err(MaterializeError::TitleExists);
        }
        Err(e) => {
            discard_assets(conn, &assets);
            return Err(MaterializeError::Persist(e));
        }
    };

    // New tags join the taxonomy once the record referencing them committed.
    for tag in &new_tags {
        if let Err(e) = forms_db_operations::insert_tag(conn, tag) {
            log::warn!("Failed to register new tag '{}': {}", tag, e);
        }
    }

    Ok(MaterializedRecord {
        permalink: config.permalink(&record_id),
        record_id,
        status,
        previous_status,
        title,
    })
}

// --- Listing service ---

const LISTING_PAGE_SIZE: u64 = 10;
const SHORT_DESC_WORDS: usize = 12;

#[derive(Debug, Serialize)]
pub struct UserSubmissions {
    pub user_posts: Vec<SubmissionListItem>,
    pub should_display_post_view: bool,
    pub is_final_page: bool,
}

fn trim_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        words.join(" ")
    } else {
        format!("{}...", words[..limit].join(" "))
    }
}

/// Paginated view of a user's own submissions, enriched with taxonomy names,
/// permalinks and the optional view count.
pub fn list_user_submissions(
    config: &Config,
    conn: &Connection,
    records: &Database,
    user_id: i64,
    page: u64,
) -> Result<UserSubmissions, DbError> {
    let (summaries, total_pages) =
        records_db_operations::list_records_by_author(records, user_id, page, LISTING_PAGE_SIZE)?;
    let should_display_post_view = config.enable_post_views;

    let user_posts = summaries
        .into_iter()
        .map(|summary| {
            let categories = summary
                .meta
                .categories
                .iter()
                .filter_map(|id| forms_db_operations::category_name(conn, *id))
                .collect();
            // Stored excerpt, falling back to the trimmed body.
            let source = if summary.meta.excerpt.is_empty() {
                summary.content.clone()
            } else {
                summary.meta.excerpt.clone()
            };
            let short_desc = trim_words(&strip_all_html(&source), SHORT_DESC_WORDS);
            let post_view = if should_display_post_view {
                users_db_operations::read_post_views(conn, &summary.id)
            } else {
                0
            };
            SubmissionListItem {
                link: config.permalink(&summary.id),
                post_id: summary.id,
                title: summary.meta.title,
                categories,
                tags: summary.meta.tags,
                date: summary.meta.created_at,
                status: summary.meta.status,
                short_desc,
                post_view,
            }
        })
        .collect();

    Ok(UserSubmissions {
        user_posts,
        should_display_post_view,
        is_final_page: total_pages <= page.max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebConfig;
    use crate::helper::schema_helpers::default_schema;
    use crate::models::{CustomFieldValue, FeaturedUpload};
    use crate::setup::db_setup;
    use std::path::Path;

    fn test_config(media_root: &Path) -> Config {
        Config {
            web: WebConfig { host: "127.0.0.1".to_string(), port: 0 },
            database_path: "/tmp/unused".to_string(),
            media_path: media_root.to_string_lossy().to_string(),
            base_url: "https://site.test".to_string(),
            allowed_origins: String::new(),
            log_level: "info".to_string(),
            session_secret_key: String::new(),
            admin_url_prefix: "manage".to_string(),
            use_secure_cookies: false,
            admin_email: "admin@site.test".to_string(),
            mail_gateway_url: String::new(),
            captcha_verify_url: String::new(),
            outbound_timeout_secs: 10,
            enable_post_views: false,
            allow_unrestricted_html: false,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        conn: Connection,
        records: Database,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_platform_db(&mut conn).unwrap();
        // Seed the author referenced by the test submissions (author_id = 1) so
        // media-ledger inserts satisfy the users foreign key.
        let author_id =
            users_db_operations::create_account(&conn, "maria", "Maria", "maria@example.org", "member")
                .unwrap();
        assert_eq!(author_id, 1);
        let records = Database::create(dir.path().join("records.db")).unwrap();
        db_setup::setup_records_db(&records).unwrap();
        Fixture { _dir: dir, config, conn, records }
    }

    fn schema() -> FormSchema {
        let mut schema = default_schema();
        schema.fields.featured_image.mode = FieldMode::Optional;
        schema
    }

    fn submission(title: &str) -> ValidatedSubmission {
        ValidatedSubmission {
            title: title.to_string(),
            excerpt: "A summary".to_string(),
            content: "<p>Hello world</p>".to_string(),
            categories: Vec::new(),
            tags: Vec::new(),
            custom_fields: Vec::new(),
            author_id: 1,
            user_name: "Maria".to_string(),
            user_email: "maria@example.org".to_string(),
            remove_featured_image: false,
            featured_image: None,
        }
    }

    #[test]
    fn img_tag_scanning() {
        let content = "<img src=\"https://x/a.png\" /><img src=\"data:image/png;base64,aGk=\" />";
        assert_eq!(count_img_tags(content), 2);
        let inline = scan_inline_images(content);
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].extension, "png");
        assert_eq!(inline[0].payload, "aGk=");
    }

    #[test]
    fn create_extracts_inline_images_and_rewrites_body() {
        let fx = fixture();
        let payload = BASE64.encode(b"not really a png");
        let mut sub = submission("Photo story");
        sub.content = format!("<p>Look</p><img src=\"data:image/png;base64,{}\" />", payload);

        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &schema(), 1, &sub, None).unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();

        assert!(!record.content.contains("base64"));
        assert!(record.content.contains("https://site.test/media/uploads/Photo-story-"));
        assert_eq!(record.media_ids.len(), 1);

        // Asset exists on disk and in the ledger under the generated name.
        let file_name =
            users_db_operations::media_file_name(&fx.conn, &record.media_ids[0]).unwrap();
        assert!(fx.config.uploads_dir().join(&file_name).exists());
        assert!(file_name.starts_with("Photo-story-"));
        assert_eq!(record.meta.form_id, 1);
    }

    #[test]
    fn undecodable_inline_image_aborts_and_cleans_up() {
        let fx = fixture();
        let good = BASE64.encode(b"fine");
        let mut sub = submission("Broken");
        sub.content = format!(
            "<img src=\"data:image/png;base64,{}\" /><img src=\"data:image/png;base64,%%bad%%\" />",
            good
        );

        match materialize(&fx.config, &fx.conn, &fx.records, &schema(), 1, &sub, None) {
            Err(MaterializeError::InlineImage) => {}
            other => panic!("expected InlineImage error, got {:?}", other.map(|_| ())),
        }

        // The first asset was written, then rolled back.
        let leftovers: Vec<_> = fx
            .config
            .uploads_dir()
            .read_dir()
            .map(|entries| entries.collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
        assert!(records_db_operations::title_exists(&fx.records, "Broken", None).map(|b| !b).unwrap());
    }

    #[test]
    fn disabled_title_keeps_previous_value_on_edit() {
        let fx = fixture();
        let mut s = schema();
        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &submission("Original"), None)
                .unwrap();
        let existing = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();

        s.fields.post_title = FieldMode::Disable;
        let mut edit = submission("");
        edit.title = String::new();
        materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &edit, Some(&existing)).unwrap();

        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        assert_eq!(record.meta.title, "Original");
    }

    #[test]
    fn featured_media_outcomes_are_mutually_exclusive() {
        let fx = fixture();
        let mut s = schema();
        s.fields.featured_image.default_media_id = "default-media".to_string();

        // No upload, no removal, no current asset: schema default applies.
        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &submission("One"), None).unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        assert_eq!(record.meta.featured_media.as_deref(), Some("default-media"));

        // Explicit replacement wins over the default.
        let mut with_upload = submission("Two");
        with_upload.featured_image = Some(FeaturedUpload {
            file_name: "cover.png".to_string(),
            data: BASE64.encode(b"cover bytes"),
        });
        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &with_upload, None).unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        let featured = record.meta.featured_media.clone().unwrap();
        assert_ne!(featured, "default-media");
        assert!(users_db_operations::media_file_name(&fx.conn, &featured).is_some());

        // Explicit removal beats both.
        let mut removal = submission("Two");
        removal.remove_featured_image = true;
        let updated = materialize(
            &fx.config, &fx.conn, &fx.records, &s, 1, &removal, Some(&record),
        )
        .unwrap();
        let record = records_db_operations::read_record(&fx.records, &updated.record_id).unwrap();
        assert!(record.meta.featured_media.is_none());
    }

    #[test]
    fn taxonomy_filtering_and_auto_assign() {
        let fx = fixture();
        let mut s = schema();
        let news = forms_db_operations::insert_category(&fx.conn, "News").unwrap();
        forms_db_operations::insert_tag(&fx.conn, "rust").unwrap();

        // Unknown category ids are dropped silently.
        let mut sub = submission("Taxed");
        sub.categories = vec![news, news + 50];
        sub.tags = vec!["rust".to_string(), "brand-new".to_string()];
        let outcome = materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &sub, None).unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        assert_eq!(record.meta.categories, vec![news]);
        // allow_new is on by default: the unknown tag is kept and registered.
        assert_eq!(record.meta.tags, vec!["rust".to_string(), "brand-new".to_string()]);
        assert!(forms_db_operations::tag_exists(&fx.conn, "brand-new"));

        // With allow_new off, unknown tag names are dropped.
        s.fields.tags.allow_new = false;
        let mut sub = submission("Taxed again");
        sub.tags = vec!["rust".to_string(), "unknown".to_string()];
        let outcome = materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &sub, None).unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        assert_eq!(record.meta.tags, vec!["rust".to_string()]);

        // Empty selection falls back to the auto-assign lists.
        s.fields.categories.auto_assign_ids = vec![news];
        s.fields.tags.auto_assign = vec!["editorial".to_string()];
        let outcome = materialize(
            &fx.config, &fx.conn, &fx.records, &s, 1, &submission("Defaults"), None,
        )
        .unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        assert_eq!(record.meta.categories, vec![news]);
        assert_eq!(record.meta.tags, vec!["editorial".to_string()]);
    }

    #[test]
    fn invalid_custom_field_values_skipped_individually() {
        let fx = fixture();
        let mut sub = submission("Fields");
        sub.custom_fields = vec![
            CustomFieldValue {
                name: "mood".to_string(),
                label: "Mood".to_string(),
                field_type: "text".to_string(),
                content: "sunny".to_string(),
            },
            CustomFieldValue {
                name: "city".to_string(),
                label: String::new(),
                field_type: "text".to_string(),
                content: "Lisbon".to_string(),
            },
        ];
        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &schema(), 1, &sub, None).unwrap();
        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        assert_eq!(record.custom_fields.len(), 1);
        assert_eq!(record.custom_fields[0].name, "mood");
    }

    #[test]
    fn author_info_merges_disabled_fields_on_edit() {
        let fx = fixture();
        let mut s = schema();
        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &submission("Merge"), None)
                .unwrap();
        let existing = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();

        s.fields.user_email = FieldMode::Disable;
        let mut edit = submission("Merge");
        edit.user_name = "New Name".to_string();
        edit.user_email = String::new();
        materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &edit, Some(&existing)).unwrap();

        let record = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        let info = record.author_info.unwrap();
        assert_eq!(info.user_name, "New Name");
        assert_eq!(info.user_email, "maria@example.org");
    }

    #[test]
    fn update_reports_previous_status_for_publish_detection() {
        let fx = fixture();
        let mut s = schema();
        let outcome =
            materialize(&fx.config, &fx.conn, &fx.records, &s, 1, &submission("Status"), None)
                .unwrap();
        assert_eq!(outcome.status, PostStatus::Draft);
        assert!(outcome.previous_status.is_none());

        let existing = records_db_operations::read_record(&fx.records, &outcome.record_id).unwrap();
        s.general.post_status = "publish".to_string();
        let updated = materialize(
            &fx.config, &fx.conn, &fx.records, &s, 1, &submission("Status"), Some(&existing),
        )
        .unwrap();
        assert_eq!(updated.status, PostStatus::Publish);
        assert_eq!(updated.previous_status, Some(PostStatus::Draft));
    }

    #[test]
    fn duplicate_title_cleans_up_written_assets() {
        let fx = fixture();
        materialize(&fx.config, &fx.conn, &fx.records, &schema(), 1, &submission("Alpha"), None)
            .unwrap();

        let mut dup = submission("Alpha");
        dup.content = format!(
            "<p>x</p><img src=\"data:image/png;base64,{}\" />",
            BASE64.encode(b"orphan candidate")
        );
        match materialize(&fx.config, &fx.conn, &fx.records, &schema(), 1, &dup, None) {
            Err(MaterializeError::TitleExists) => {}
            other => panic!("expected TitleExists, got {:?}", other.map(|_| ())),
        }

        // The first record's body had no images, so any surviving file would
        // be an orphan from the failed duplicate.
        let leftovers: Vec<_> = fx
            .config
            .uploads_dir()
            .read_dir()
            .map(|entries| entries.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn listing_enriches_and_flags_final_page() {
        let fx = fixture();
        let news = forms_db_operations::insert_category(&fx.conn, "News").unwrap();
        let mut sub = submission("Listed post");
        sub.categories = vec![news];
        sub.excerpt = String::new();
        sub.content = "<p>one two three four five six seven eight nine ten eleven twelve thirteen</p>".to_string();
        materialize(&fx.config, &fx.conn, &fx.records, &schema(), 1, &sub, None).unwrap();

        let listing =
            list_user_submissions(&fx.config, &fx.conn, &fx.records, 1, 1).unwrap();
        assert_eq!(listing.user_posts.len(), 1);
        assert!(listing.is_final_page);
        assert!(!listing.should_display_post_view);

        let item = &listing.user_posts[0];
        assert_eq!(item.title, "Listed post");
        assert_eq!(item.categories, vec!["News".to_string()]);
        assert_eq!(item.link, format!("https://site.test/p/{}", item.post_id));
        // Body fallback, trimmed to twelve words.
        assert!(item.short_desc.ends_with("..."));
        assert_eq!(item.short_desc.split_whitespace().count(), 12);
        assert_eq!(item.post_view, 0);
    }
}
