use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-field behavior switch used across the form configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    Require,
    Optional,
    Disable,
}

/// Publication status of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Pending,
    Private,
    Publish,
    Trash,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Private => "private",
            PostStatus::Publish => "publish",
            PostStatus::Trash => "trash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorAccess {
    OnlyLoggedUser,
    AllowGuest,
}

// --- Form schema sections ---
//
// A schema is stored as one JSON blob per form. These structs are the
// normalized shape produced by the schema validator; reads from the store
// deserialize directly since only validated data is ever persisted.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Target status key: draft | pending_review | private | publish.
    pub post_status: String,
    pub redirect_url: String,
    pub unique_title: bool,
    pub form_layout_type: String,
}

impl GeneralSettings {
    /// Maps the configured status key onto a record status, defaulting to
    /// draft for unknown keys.
    pub fn target_status(&self) -> PostStatus {
        match self.post_status.as_str() {
            "publish" => PostStatus::Publish,
            "pending_review" => PostStatus::Pending,
            "private" => PostStatus::Private,
            _ => PostStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginPrompt {
    pub message: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLoginSettings {
    pub author_access: AuthorAccess,
    /// Account assigned to guest submissions when guests are allowed.
    pub fallback_author_id: i64,
    pub login_prompt: LoginPrompt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedImageSettings {
    pub mode: FieldMode,
    /// Upload cap in kilobytes; 0 means no cap.
    pub upload_limit: u64,
    /// Media asset assigned when a record ends up with no featured image.
    pub default_media_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySettings {
    pub multiple: bool,
    pub exclude_ids: Vec<i64>,
    pub auto_assign_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSettings {
    pub multiple: bool,
    pub allow_new: bool,
    pub exclude: Vec<String>,
    pub auto_assign: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormFields {
    pub user_name: FieldMode,
    pub user_email: FieldMode,
    pub post_title: FieldMode,
    pub excerpt: FieldMode,
    pub editor_type: String,
    pub max_images: u64,
    /// Per-image cap in kilobytes for inline images.
    pub max_image_size: u64,
    pub featured_image: FeaturedImageSettings,
    pub categories: CategorySettings,
    pub tags: TagSettings,
    pub custom_fields: Vec<CustomFieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSettings {
    pub enabled: bool,
    pub question: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptchaSettings {
    pub enabled: bool,
    pub site_key: String,
    /// Only ever resolved server-side; stripped from anonymous reads.
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub challenge: ChallengeSettings,
    pub captcha: CaptchaSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub enabled: bool,
    pub subject: String,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNotificationChannel {
    pub enabled: bool,
    /// Explicit recipient; falls back to the platform admin address.
    pub email: String,
    pub subject: String,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub admin_on_submit: AdminNotificationChannel,
    pub author_on_submit: NotificationChannel,
    pub author_on_publish: NotificationChannel,
    pub author_on_trash: NotificationChannel,
}

/// The full, validated settings document for one submission form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub general: GeneralSettings,
    pub user_login: UserLoginSettings,
    pub fields: FormFields,
    pub security: SecuritySettings,
    pub notifications: NotificationSettings,
}

/// One row of the form settings store.
#[derive(Debug, Serialize)]
pub struct FormRow {
    pub id: i64,
    pub title: String,
    pub data: String,
}

// --- Content records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub title: String,
    pub excerpt: String,
    pub status: PostStatus,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub categories: Vec<i64>,
    pub tags: Vec<String>,
    pub featured_media: Option<String>,
    /// Back-reference to the form the record was submitted through.
    pub form_id: i64,
}

/// Submission-time captured identity, independent of the platform account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub user_name: String,
    pub user_email: String,
}

/// A submitted custom-field value persisted under its field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: String,
    pub content: String,
    pub meta: RecordMetadata,
    pub author_info: Option<AuthorInfo>,
    pub custom_fields: Vec<CustomFieldValue>,
    pub media_ids: Vec<String>,
}

/// Storage-level view of a record used by the listing service; carries the
/// body so the excerpt fallback can be derived without a second read.
#[derive(Debug, Clone)]
pub struct RecordSummary {
    pub id: String,
    pub meta: RecordMetadata,
    pub content: String,
}

/// One entry of a user's submission listing.
#[derive(Debug, Serialize)]
pub struct SubmissionListItem {
    pub post_id: String,
    pub title: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub date: DateTime<Utc>,
    pub status: PostStatus,
    pub link: String,
    pub short_desc: String,
    pub post_view: u64,
}

// --- Platform accounts (owned by the host platform, read-only here) ---

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub role: String,
}

// --- Client submission payload ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeaturedUpload {
    pub file_name: String,
    /// Raw base64 payload of the uploaded file.
    pub data: String,
}

/// Untrusted form-fill input carried by the submit and update calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
    #[serde(default)]
    pub captcha_response: String,
    /// Answer to the configured anti-bot challenge question. Collected but
    /// not verified on the create path; see the note in submission_helpers.
    #[serde(default)]
    pub challenge_response: String,
    #[serde(default)]
    pub remove_featured_image: bool,
    #[serde(default)]
    pub featured_image: Option<FeaturedUpload>,
}

/// Submission data after the validator has accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub categories: Vec<i64>,
    pub tags: Vec<String>,
    pub custom_fields: Vec<CustomFieldValue>,
    pub author_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub remove_featured_image: bool,
    pub featured_image: Option<FeaturedUpload>,
}

pub mod db_operations;
