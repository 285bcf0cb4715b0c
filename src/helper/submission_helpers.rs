use redb::Database;
use rusqlite::Connection;
use thiserror::Error;

use crate::config::Config;
use crate::helper::content_helpers::{count_img_tags, scan_inline_images};
use crate::helper::sanitization_helpers::strip_all_html;
use crate::helper::schema_helpers::is_valid_email;
use crate::models::db_operations::{records_db_operations, users_db_operations};
use crate::models::{
    Account, AuthorAccess, FieldMode, FormSchema, StoredRecord, SubmissionPayload,
    ValidatedSubmission,
};

/// Markup a rich editor emits for a visually empty document.
pub const EMPTY_EDITOR_MARKUP: &str = "<p><br></p>";

const ALLOWED_FEATURED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "svg"];

/// First failing check wins; callers surface exactly one message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("reCAPTCHA response is missing.")]
    CaptchaResponseMissing,
    #[error("reCAPTCHA secret key is missing.")]
    CaptchaSecretMissing,
    #[error("reCAPTCHA verification could not be completed. Please try again.")]
    CaptchaUnavailable,
    #[error("Invalid reCAPTCHA.")]
    CaptchaRejected,
    #[error("Please provide the content for your post before submitting.")]
    ContentMissing,
    #[error("The post title is not allowed!")]
    TitleNotAllowed,
    #[error("Title is missing!")]
    TitleMissing,
    #[error("The title already exists.")]
    TitleExists,
    #[error("The post excerpt is not allowed!")]
    ExcerptNotAllowed,
    #[error("Post excerpt is missing!")]
    ExcerptMissing,
    #[error("You have reached the maximum limit of {0} images.")]
    TooManyImages(u64),
    #[error("The size {size} of the image has exceeded the allowed limit, which is {limit}KB.")]
    ImageTooLarge { size: u64, limit: u64 },
    #[error("The user name is not allowed!")]
    UserNameNotAllowed,
    #[error("User name is missing!")]
    UserNameMissing,
    #[error("User email is not allowed!")]
    UserEmailNotAllowed,
    #[error("User email is missing!")]
    UserEmailMissing,
    #[error("User email is invalid.")]
    UserEmailInvalid,
    #[error("You need to log in before submitting a post.")]
    LoginRequired,
    #[error("The default author is not configured. Please contact the site operator for assistance.")]
    FallbackAuthorMissing,
    #[error("An error occurred while trying to assign the author. Please contact the site operator for assistance.")]
    FallbackAuthorInvalid,
    #[error("Invalid file or extension. Allowed extensions: JPG, JPEG, PNG, GIF, SVG.")]
    FeaturedImageExtension,
    #[error("Image size exceeds the allowed limit! Please choose an image with a smaller size.")]
    FeaturedImageTooLarge,
    #[error("A featured image is required for this submission. Please upload an image to proceed.")]
    FeaturedImageRequired,
}

/// Decoded byte size of a base64 payload, computed from its length.
fn base64_decoded_size(payload: &str) -> u64 {
    (payload.len() as u64 * 3) / 4
}

/// Verifies the anti-bot response token against the third-party endpoint.
/// Network failure blocks the submission; anti-bot is a hard gate.
pub async fn verify_captcha(
    client: &reqwest::Client,
    verify_url: &str,
    secret_key: &str,
    response_token: &str,
) -> Result<(), SubmissionError> {
    if response_token.is_empty() {
        return Err(SubmissionError::CaptchaResponseMissing);
    }
    if secret_key.is_empty() {
        return Err(SubmissionError::CaptchaSecretMissing);
    }

    let params = [("secret", secret_key), ("response", response_token)];
    let verdict = client
        .post(verify_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| {
            log::warn!("Anti-bot verification request failed: {}", e);
            SubmissionError::CaptchaUnavailable
        })?
        .json::<serde_json::Value>()
        .await
        .map_err(|e| {
            log::warn!("Anti-bot verification returned an unreadable body: {}", e);
            SubmissionError::CaptchaUnavailable
        })?;

    if verdict.get("success").and_then(|v| v.as_bool()).unwrap_or(false) {
        Ok(())
    } else {
        Err(SubmissionError::CaptchaRejected)
    }
}

/// Full validation pass for create and edit. Runs the anti-bot gate first,
/// then the state-independent field checks in order.
///
/// The challenge question/answer pair is stored and served to clients, but
/// the submitted `challenge_response` is not checked here; answering the
/// question is handled in the form itself before the request is sent.
pub async fn validate_submission(
    client: &reqwest::Client,
    config: &Config,
    conn: &Connection,
    records: &Database,
    schema: &FormSchema,
    payload: &SubmissionPayload,
    account: Option<&Account>,
    existing: Option<&StoredRecord>,
) -> Result<ValidatedSubmission, SubmissionError> {
    if schema.security.captcha.enabled {
        verify_captcha(
            client,
            &config.captcha_verify_url,
            &schema.security.captcha.secret_key,
            &payload.captcha_response,
        )
        .await?;
    }

    validate_submission_fields(conn, records, schema, payload, account, existing)
}

/// Everything after the anti-bot gate. Checks run in a fixed order and stop
/// at the first violation; no persistent state is touched.
pub fn validate_submission_fields(
    conn: &Connection,
    records: &Database,
    schema: &FormSchema,
    payload: &SubmissionPayload,
    account: Option<&Account>,
    existing: Option<&StoredRecord>,
) -> Result<ValidatedSubmission, SubmissionError> {
    let content = payload.content.trim();
    if content.is_empty() || content == EMPTY_EDITOR_MARKUP {
        return Err(SubmissionError::ContentMissing);
    }

    let title = strip_all_html(&payload.title).trim().to_string();
    match schema.fields.post_title {
        FieldMode::Disable if !title.is_empty() => return Err(SubmissionError::TitleNotAllowed),
        FieldMode::Require if title.is_empty() => return Err(SubmissionError::TitleMissing),
        _ => {}
    }
    if schema.general.unique_title && !title.is_empty() {
        // Advisory pre-check; the binding check runs again inside the record
        // write transaction.
        let taken = records_db_operations::title_exists(
            records,
            &title,
            existing.map(|record| record.id.as_str()),
        )
        .unwrap_or(false);
        if taken {
            return Err(SubmissionError::TitleExists);
        }
    }

    let excerpt = strip_all_html(&payload.excerpt).trim().to_string();
    match schema.fields.excerpt {
        FieldMode::Disable if !excerpt.is_empty() => return Err(SubmissionError::ExcerptNotAllowed),
        FieldMode::Require if excerpt.is_empty() => return Err(SubmissionError::ExcerptMissing),
        _ => {}
    }

    if count_img_tags(content) as u64 > schema.fields.max_images {
        return Err(SubmissionError::TooManyImages(schema.fields.max_images));
    }
    let size_limit = schema.fields.max_image_size * 1024;
    for image in scan_inline_images(content) {
        let size = base64_decoded_size(&image.payload);
        if size > size_limit {
            return Err(SubmissionError::ImageTooLarge {
                size,
                limit: schema.fields.max_image_size,
            });
        }
    }

    let (user_name, user_email) = match account {
        Some(account) => (account.display_name.clone(), account.email.clone()),
        None => {
            let user_name = strip_all_html(&payload.user_name).trim().to_string();
            match schema.fields.user_name {
                FieldMode::Disable if !user_name.is_empty() => {
                    return Err(SubmissionError::UserNameNotAllowed)
                }
                FieldMode::Require if user_name.is_empty() => {
                    return Err(SubmissionError::UserNameMissing)
                }
                _ => {}
            }

            let user_email = payload.user_email.trim().to_string();
            match schema.fields.user_email {
                FieldMode::Disable if !user_email.is_empty() => {
                    return Err(SubmissionError::UserEmailNotAllowed)
                }
                FieldMode::Require if user_email.is_empty() => {
                    return Err(SubmissionError::UserEmailMissing)
                }
                _ => {}
            }
            if !user_email.is_empty() && !is_valid_email(&user_email) {
                return Err(SubmissionError::UserEmailInvalid);
            }

            (user_name, user_email)
        }
    };

    let author_id = match account {
        Some(account) => account.id,
        None => {
            if schema.user_login.author_access == AuthorAccess::OnlyLoggedUser {
                return Err(SubmissionError::LoginRequired);
            }
            let fallback = schema.user_login.fallback_author_id;
            if fallback <= 0 {
                return Err(SubmissionError::FallbackAuthorMissing);
            }
            if !users_db_operations::account_exists(conn, fallback) {
                return Err(SubmissionError::FallbackAuthorInvalid);
            }
            fallback
        }
    };

    let featured_mode = schema.fields.featured_image.mode;
    let mut remove_featured_image = payload.remove_featured_image;
    let mut featured_image = payload.featured_image.clone();

    if featured_mode == FieldMode::Disable {
        featured_image = None;
        remove_featured_image = true;
    } else {
        if let Some(upload) = &featured_image {
            let extension = upload
                .file_name
                .rsplit('.')
                .next()
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if upload.file_name.is_empty()
                || !ALLOWED_FEATURED_EXTENSIONS.contains(&extension.as_str())
            {
                return Err(SubmissionError::FeaturedImageExtension);
            }
            let limit = schema.fields.featured_image.upload_limit;
            if limit > 0 && base64_decoded_size(&upload.data) > limit * 1024 {
                return Err(SubmissionError::FeaturedImageTooLarge);
            }
        }

        let has_existing = existing
            .map(|record| record.meta.featured_media.is_some())
            .unwrap_or(false);
        if featured_mode == FieldMode::Require && !has_existing && featured_image.is_none() {
            return Err(SubmissionError::FeaturedImageRequired);
        }
    }

    Ok(ValidatedSubmission {
        title,
        excerpt,
        content: content.to_string(),
        categories: payload.categories.clone(),
        tags: payload
            .tags
            .iter()
            .map(|tag| strip_all_html(tag).trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
        custom_fields: payload.custom_fields.clone(),
        author_id,
        user_name,
        user_email,
        remove_featured_image,
        featured_image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::schema_helpers::default_schema;
    use crate::models::db_operations::records_db_operations::{create_record, RecordWrite};
    use crate::models::{AuthorInfo, FeaturedUpload, PostStatus, RecordMetadata};
    use crate::setup::db_setup;
    use chrono::Utc;

    struct Fixture {
        _dir: tempfile::TempDir,
        conn: Connection,
        records: Database,
        fallback_id: i64,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_platform_db(&mut conn).unwrap();
        let records = Database::create(dir.path().join("records.db")).unwrap();
        db_setup::setup_records_db(&records).unwrap();
        let fallback_id = users_db_operations::create_account(
            &conn,
            "fallback",
            "Site Author",
            "author@example.org",
            "member",
        )
        .unwrap();
        Fixture { _dir: dir, conn, records, fallback_id }
    }

    fn guest_schema(fixture: &Fixture) -> FormSchema {
        let mut schema = default_schema();
        schema.user_login.fallback_author_id = fixture.fallback_id;
        schema.fields.featured_image.mode = FieldMode::Optional;
        schema
    }

    fn guest_payload() -> SubmissionPayload {
        SubmissionPayload {
            title: "First post".to_string(),
            excerpt: "A summary".to_string(),
            content: "<p>Hello world</p>".to_string(),
            user_name: "Maria".to_string(),
            user_email: "maria@example.org".to_string(),
            ..SubmissionPayload::default()
        }
    }

    fn inline_image_content(payload_len: usize) -> String {
        format!(
            "<p>Text</p><img src=\"data:image/png;base64,{}\" />",
            "A".repeat(payload_len)
        )
    }

    #[test]
    fn valid_guest_submission_resolves_fallback_author() {
        let fx = fixture();
        let schema = guest_schema(&fx);
        let validated = validate_submission_fields(
            &fx.conn, &fx.records, &schema, &guest_payload(), None, None,
        )
        .unwrap();
        assert_eq!(validated.author_id, fx.fallback_id);
        assert_eq!(validated.user_name, "Maria");
    }

    #[test]
    fn empty_or_placeholder_content_rejected() {
        let fx = fixture();
        let schema = guest_schema(&fx);

        let mut payload = guest_payload();
        payload.content = "   ".to_string();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::ContentMissing)
        );

        payload.content = EMPTY_EDITOR_MARKUP.to_string();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::ContentMissing)
        );
    }

    #[test]
    fn title_modes_enforced() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);

        let mut payload = guest_payload();
        payload.title = String::new();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::TitleMissing)
        );

        schema.fields.post_title = FieldMode::Disable;
        payload.title = "Sneaky".to_string();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::TitleNotAllowed)
        );
    }

    fn seed_record(fx: &Fixture, title: &str, author_id: i64) -> String {
        create_record(
            &fx.records,
            &RecordWrite {
                content: "<p>Body</p>".to_string(),
                meta: RecordMetadata {
                    title: title.to_string(),
                    excerpt: "x".to_string(),
                    status: PostStatus::Draft,
                    author_id,
                    created_at: Utc::now(),
                    last_updated_at: None,
                    categories: vec![],
                    tags: vec![],
                    featured_media: None,
                    form_id: 1,
                },
                author_info: AuthorInfo::default(),
                custom_fields: vec![],
                media_ids: vec![],
                enforce_unique_title: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn duplicate_title_rejected_unless_editing_self() {
        let fx = fixture();
        let schema = guest_schema(&fx);
        let record_id = seed_record(&fx, "Alpha", fx.fallback_id);

        let mut payload = guest_payload();
        payload.title = "Alpha".to_string();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::TitleExists)
        );

        // Editing the record that owns the title is fine.
        let existing = records_db_operations::read_record(&fx.records, &record_id).unwrap();
        assert!(validate_submission_fields(
            &fx.conn, &fx.records, &schema, &payload, None, Some(&existing),
        )
        .is_ok());
    }

    #[test]
    fn image_count_limit_is_inclusive() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);
        schema.fields.max_images = 2;

        let mut payload = guest_payload();
        payload.content =
            "<p>a</p><img src=\"https://x/a.png\" /><img src=\"https://x/b.png\" />".to_string();
        assert!(validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None).is_ok());

        payload.content.push_str("<img src=\"https://x/c.png\" />");
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::TooManyImages(2))
        );
    }

    #[test]
    fn inline_image_size_boundary() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);
        schema.fields.max_image_size = 3; // 3072 bytes

        // 4096 base64 chars decode to exactly 3072 bytes.
        let mut payload = guest_payload();
        payload.content = inline_image_content(4096);
        assert!(validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None).is_ok());

        payload.content = inline_image_content(4104);
        assert!(matches!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn guest_identity_follows_field_modes() {
        let fx = fixture();
        let schema = guest_schema(&fx);

        let mut payload = guest_payload();
        payload.user_name = String::new();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::UserNameMissing)
        );

        payload.user_name = "Maria".to_string();
        payload.user_email = "not-an-address".to_string();
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::UserEmailInvalid)
        );
    }

    #[test]
    fn authenticated_identity_overrides_guest_fields() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);
        // Guest fields required, but the account supplies them.
        schema.fields.user_name = FieldMode::Require;
        let account = Account {
            id: 42,
            username: "sam".to_string(),
            display_name: "Sam Field".to_string(),
            email: "sam@example.org".to_string(),
            role: "member".to_string(),
        };

        let mut payload = guest_payload();
        payload.user_name = String::new();
        payload.user_email = String::new();
        let validated = validate_submission_fields(
            &fx.conn, &fx.records, &schema, &payload, Some(&account), None,
        )
        .unwrap();
        assert_eq!(validated.author_id, 42);
        assert_eq!(validated.user_email, "sam@example.org");
    }

    #[test]
    fn login_required_policy_rejects_anonymous() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);
        schema.user_login.author_access = AuthorAccess::OnlyLoggedUser;
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &guest_payload(), None, None),
            Err(SubmissionError::LoginRequired)
        );
    }

    #[test]
    fn missing_fallback_author_rejects_guest() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);
        schema.user_login.fallback_author_id = 0;
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &guest_payload(), None, None),
            Err(SubmissionError::FallbackAuthorMissing)
        );

        schema.user_login.fallback_author_id = fx.fallback_id + 99;
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &guest_payload(), None, None),
            Err(SubmissionError::FallbackAuthorInvalid)
        );
    }

    #[test]
    fn featured_image_rules() {
        let fx = fixture();
        let mut schema = guest_schema(&fx);
        schema.fields.featured_image.mode = FieldMode::Require;

        // Required with no upload and no existing asset.
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &guest_payload(), None, None),
            Err(SubmissionError::FeaturedImageRequired)
        );

        let mut payload = guest_payload();
        payload.featured_image = Some(FeaturedUpload {
            file_name: "cover.bmp".to_string(),
            data: "AAAA".to_string(),
        });
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::FeaturedImageExtension)
        );

        schema.fields.featured_image.upload_limit = 1; // 1024 bytes
        payload.featured_image = Some(FeaturedUpload {
            file_name: "cover.png".to_string(),
            data: "A".repeat(2048),
        });
        assert_eq!(
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None),
            Err(SubmissionError::FeaturedImageTooLarge)
        );

        // Disabled mode drops the upload and forces removal.
        schema.fields.featured_image.mode = FieldMode::Disable;
        let validated =
            validate_submission_fields(&fx.conn, &fx.records, &schema, &payload, None, None).unwrap();
        assert!(validated.featured_image.is_none());
        assert!(validated.remove_featured_image);
    }
}
