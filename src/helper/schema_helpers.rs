use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;

use crate::helper::sanitization_helpers::{sanitize_rich_html, strip_all_html};
use crate::models::{
    AdminNotificationChannel, AuthorAccess, CaptchaSettings, CategorySettings, ChallengeSettings,
    CustomFieldSpec, FeaturedImageSettings, FieldMode, FormFields, FormSchema, GeneralSettings,
    LoginPrompt, NotificationChannel, NotificationSettings, SecuritySettings, TagSettings,
    UserLoginSettings,
};

/// A schema is accepted in full or rejected in full; the first failing
/// section wins and nothing is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Data is missing some fields!")]
    MissingSections,
    #[error("General setting data is invalid.")]
    GeneralInvalid,
    #[error("User login setting data is invalid.")]
    UserLoginInvalid,
    #[error("Form fields setting data is invalid.")]
    FieldsInvalid,
    #[error("Security setting data is invalid.")]
    SecurityInvalid,
    #[error("Notification setting data is invalid.")]
    NotificationsInvalid,
}

pub fn is_valid_email(value: &str) -> bool {
    let email_re = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    email_re.is_match(value)
}

// --- Leaf sanitizers ---
//
// Each returns None when the raw value cannot be coerced, which rejects the
// owning section. Missing keys and wrong types are indistinguishable on
// purpose; the caller only ever reports the section.

fn text_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)?
        .as_str()
        .map(|s| strip_all_html(s).trim().to_string())
}

/// Permissive truthy/falsy parsing with null-on-failure.
fn bool_field(obj: &Value, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "" | "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn uint_field(obj: &Value, key: &str) -> Option<u64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Empty string is valid (treated as "unset"); anything else must parse.
fn url_field(obj: &Value, key: &str) -> Option<String> {
    let raw = obj.get(key)?.as_str()?.trim().to_string();
    if raw.is_empty() {
        return Some(raw);
    }
    url::Url::parse(&raw).ok().map(|_| raw)
}

/// Empty-or-valid contract, mirroring the URL fields.
fn email_field(obj: &Value, key: &str) -> Option<String> {
    let raw = obj.get(key)?.as_str()?.trim().to_string();
    if raw.is_empty() || is_valid_email(&raw) {
        return Some(raw);
    }
    None
}

fn html_field(obj: &Value, key: &str, unrestricted: bool) -> Option<String> {
    let raw = obj.get(key)?.as_str()?;
    if unrestricted {
        Some(raw.to_string())
    } else {
        Some(sanitize_rich_html(raw))
    }
}

fn mode_field(obj: &Value, key: &str) -> Option<FieldMode> {
    match obj.get(key)?.as_str()? {
        "require" => Some(FieldMode::Require),
        "optional" => Some(FieldMode::Optional),
        "disable" => Some(FieldMode::Disable),
        _ => None,
    }
}

fn id_list_field(obj: &Value, key: &str) -> Option<Vec<i64>> {
    let items = obj.get(key)?.as_array()?;
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = match item {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        ids.push(id);
    }
    Some(ids)
}

fn text_list_field(obj: &Value, key: &str) -> Option<Vec<String>> {
    let items = obj.get(key)?.as_array()?;
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        values.push(strip_all_html(item.as_str()?).trim().to_string());
    }
    Some(values)
}

// --- Section parsers ---

fn parse_general(obj: &Value) -> Option<GeneralSettings> {
    Some(GeneralSettings {
        post_status: text_field(obj, "post_status")?,
        redirect_url: url_field(obj, "redirect_url")?,
        unique_title: bool_field(obj, "unique_title")?,
        form_layout_type: text_field(obj, "form_layout_type")?,
    })
}

fn parse_user_login(obj: &Value) -> Option<UserLoginSettings> {
    let author_access = match obj.get("author_access")?.as_str()? {
        "only_logged_user" => AuthorAccess::OnlyLoggedUser,
        "allow_guest" => AuthorAccess::AllowGuest,
        _ => return None,
    };
    let prompt = obj.get("login_prompt")?;
    Some(UserLoginSettings {
        author_access,
        fallback_author_id: uint_field(obj, "fallback_author_id")? as i64,
        login_prompt: LoginPrompt {
            message: text_field(prompt, "message")?,
            title: text_field(prompt, "title")?,
            description: text_field(prompt, "description")?,
        },
    })
}

fn parse_custom_fields(obj: &Value) -> Option<Vec<CustomFieldSpec>> {
    let entries = obj.get("custom_fields")?.as_array()?;
    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = text_field(entry, "name")?;
        let label = text_field(entry, "label")?;
        let field_type = text_field(entry, "type")?;
        // One malformed descriptor rejects the whole list, unlike submitted
        // custom-field values which are skipped individually.
        if name.is_empty() || label.is_empty() || field_type.is_empty() {
            return None;
        }
        specs.push(CustomFieldSpec { name, label, field_type });
    }
    Some(specs)
}

fn parse_fields(obj: &Value) -> Option<FormFields> {
    let featured = obj.get("featured_image")?;
    let categories = obj.get("categories")?;
    let tags = obj.get("tags")?;
    Some(FormFields {
        user_name: mode_field(obj, "user_name")?,
        user_email: mode_field(obj, "user_email")?,
        post_title: mode_field(obj, "post_title")?,
        excerpt: mode_field(obj, "excerpt")?,
        editor_type: text_field(obj, "editor_type")?,
        max_images: uint_field(obj, "max_images")?,
        max_image_size: uint_field(obj, "max_image_size")?,
        featured_image: FeaturedImageSettings {
            mode: mode_field(featured, "mode")?,
            upload_limit: uint_field(featured, "upload_limit")?,
            default_media_id: text_field(featured, "default_media_id")?,
        },
        categories: CategorySettings {
            multiple: bool_field(categories, "multiple")?,
            exclude_ids: id_list_field(categories, "exclude_ids")?,
            auto_assign_ids: id_list_field(categories, "auto_assign_ids")?,
        },
        tags: TagSettings {
            multiple: bool_field(tags, "multiple")?,
            allow_new: bool_field(tags, "allow_new")?,
            exclude: text_list_field(tags, "exclude")?,
            auto_assign: text_list_field(tags, "auto_assign")?,
        },
        custom_fields: parse_custom_fields(obj)?,
    })
}

fn parse_security(obj: &Value) -> Option<SecuritySettings> {
    let challenge = obj.get("challenge")?;
    let captcha = obj.get("captcha")?;
    Some(SecuritySettings {
        challenge: ChallengeSettings {
            enabled: bool_field(challenge, "enabled")?,
            question: text_field(challenge, "question")?,
            response: text_field(challenge, "response")?,
        },
        captcha: CaptchaSettings {
            enabled: bool_field(captcha, "enabled")?,
            site_key: text_field(captcha, "site_key")?,
            secret_key: text_field(captcha, "secret_key")?,
        },
    })
}

fn parse_channel(obj: &Value, key: &str, unrestricted: bool) -> Option<NotificationChannel> {
    let channel = obj.get(key)?;
    Some(NotificationChannel {
        enabled: bool_field(channel, "enabled")?,
        subject: text_field(channel, "subject")?,
        title: text_field(channel, "title")?,
        message: html_field(channel, "message", unrestricted)?,
    })
}

fn parse_notifications(obj: &Value, unrestricted: bool) -> Option<NotificationSettings> {
    let admin = obj.get("admin_on_submit")?;
    Some(NotificationSettings {
        admin_on_submit: AdminNotificationChannel {
            enabled: bool_field(admin, "enabled")?,
            email: email_field(admin, "email")?,
            subject: text_field(admin, "subject")?,
            title: text_field(admin, "title")?,
            message: html_field(admin, "message", unrestricted)?,
        },
        author_on_submit: parse_channel(obj, "author_on_submit", unrestricted)?,
        author_on_publish: parse_channel(obj, "author_on_publish", unrestricted)?,
        author_on_trash: parse_channel(obj, "author_on_trash", unrestricted)?,
    })
}

fn section<'a>(raw: &'a Value, key: &str) -> Result<&'a Value, SchemaError> {
    let value = raw.get(key).ok_or(SchemaError::MissingSections)?;
    match value.as_object() {
        Some(map) if !map.is_empty() => Ok(value),
        _ => Err(SchemaError::MissingSections),
    }
}

/// Validates an untrusted settings document into the canonical schema.
///
/// Validation is idempotent: feeding the serialized output back in yields the
/// same normalized schema. `unrestricted_html` lets the notification message
/// templates through without the safe-tag allowlist.
pub fn validate_schema(raw: &Value, unrestricted_html: bool) -> Result<FormSchema, SchemaError> {
    let general = section(raw, "general")?;
    let user_login = section(raw, "user_login")?;
    let fields = section(raw, "fields")?;
    let security = section(raw, "security")?;
    let notifications = section(raw, "notifications")?;

    Ok(FormSchema {
        general: parse_general(general).ok_or(SchemaError::GeneralInvalid)?,
        user_login: parse_user_login(user_login).ok_or(SchemaError::UserLoginInvalid)?,
        fields: parse_fields(fields).ok_or(SchemaError::FieldsInvalid)?,
        security: parse_security(security).ok_or(SchemaError::SecurityInvalid)?,
        notifications: parse_notifications(notifications, unrestricted_html)
            .ok_or(SchemaError::NotificationsInvalid)?,
    })
}

/// The schema as served to anonymous clients: the notification section and
/// the server-side secrets are stripped, the CAPTCHA site key stays since
/// clients need it to render the widget.
pub fn client_view(schema: &FormSchema) -> Value {
    let mut view = serde_json::to_value(schema).unwrap_or_else(|_| json!({}));
    if let Some(map) = view.as_object_mut() {
        map.remove("notifications");
    }
    if let Some(challenge) = view.pointer_mut("/security/challenge/response") {
        *challenge = json!("");
    }
    if let Some(secret) = view.pointer_mut("/security/captcha/secret_key") {
        *secret = json!("");
    }
    view
}

/// Starter configuration seeded by the setup CLI and used as a baseline in
/// tests.
pub fn default_schema() -> FormSchema {
    FormSchema {
        general: GeneralSettings {
            post_status: "draft".to_string(),
            redirect_url: String::new(),
            unique_title: true,
            form_layout_type: "2_cols".to_string(),
        },
        user_login: UserLoginSettings {
            author_access: AuthorAccess::AllowGuest,
            fallback_author_id: 1,
            login_prompt: LoginPrompt {
                message: "Please log in to securely submit your content. If you do not have an account, sign up quickly to get started!".to_string(),
                title: "Login Required to Submit".to_string(),
                description: "You must be logged in to submit a new post. Please log in to continue.".to_string(),
            },
        },
        fields: FormFields {
            user_name: FieldMode::Require,
            user_email: FieldMode::Require,
            post_title: FieldMode::Require,
            excerpt: FieldMode::Require,
            editor_type: "rich_editor".to_string(),
            max_images: 3,
            max_image_size: 100,
            featured_image: FeaturedImageSettings {
                mode: FieldMode::Require,
                upload_limit: 0,
                default_media_id: String::new(),
            },
            categories: CategorySettings {
                multiple: true,
                exclude_ids: Vec::new(),
                auto_assign_ids: Vec::new(),
            },
            tags: TagSettings {
                multiple: true,
                allow_new: true,
                exclude: Vec::new(),
                auto_assign: Vec::new(),
            },
            custom_fields: Vec::new(),
        },
        security: SecuritySettings {
            challenge: ChallengeSettings {
                enabled: false,
                question: String::new(),
                response: String::new(),
            },
            captcha: CaptchaSettings {
                enabled: false,
                site_key: String::new(),
                secret_key: String::new(),
            },
        },
        notifications: NotificationSettings {
            admin_on_submit: AdminNotificationChannel {
                enabled: false,
                email: String::new(),
                subject: "New Post Submitted".to_string(),
                title: "Notification: A New Post Has Been Submitted".to_string(),
                message: "Dear Admin, <br>We would like to inform you that a new post titled \"{{post_title}}\" has been successfully submitted. Please check and review the post in the system. <br>Best regards, The Support Team".to_string(),
            },
            author_on_submit: NotificationChannel {
                enabled: false,
                subject: "Your Post Has Been Successfully Submitted".to_string(),
                title: "Confirmation: Your Post Submission".to_string(),
                message: "Dear Author, <br>We would like to inform you that your post titled \"{{post_title}}\" has been successfully submitted. Our team will review your post and notify you once its published. Thank you for your contribution! <br>Best regards, The Support Team".to_string(),
            },
            author_on_publish: NotificationChannel {
                enabled: false,
                subject: "Your Post Has Been Published".to_string(),
                title: "Congratulations: Your Post Is Now Live".to_string(),
                message: "Dear author, <br>We are excited to inform you that your post titled \"{{post_title}}\" has been successfully published on our platform. You can now view your post live here: {{post_link}} Thank you for your contribution, and we look forward to more great content from you! <br>Best regards, The Support Team".to_string(),
            },
            author_on_trash: NotificationChannel {
                enabled: false,
                subject: "Your Post Has Been Deleted".to_string(),
                title: "Notice: Your Post Has Been Removed".to_string(),
                message: "Dear Author, <br>We regret to inform you that your post titled \"{{post_title}}\" has been removed from our platform. If you have any questions or concerns about this, please feel free to contact us. Thank you for your understanding. <br>Best regards, The Support Team".to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_value() -> Value {
        serde_json::to_value(default_schema()).unwrap()
    }

    #[test]
    fn default_schema_validates_and_is_idempotent() {
        let first = validate_schema(&default_value(), false).unwrap();
        assert_eq!(first, default_schema());

        let second = validate_schema(&serde_json::to_value(&first).unwrap(), false).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn missing_section_rejects_whole_document() {
        let mut raw = default_value();
        raw.as_object_mut().unwrap().remove("security");
        assert_eq!(validate_schema(&raw, false), Err(SchemaError::MissingSections));

        let mut raw = default_value();
        *raw.pointer_mut("/user_login").unwrap() = json!({});
        assert_eq!(validate_schema(&raw, false), Err(SchemaError::MissingSections));
    }

    #[test]
    fn invalid_redirect_url_rejects_general_section() {
        let mut raw = default_value();
        *raw.pointer_mut("/general/redirect_url").unwrap() = json!("not a url");
        assert_eq!(validate_schema(&raw, false), Err(SchemaError::GeneralInvalid));

        // Empty means "unset" and passes.
        *raw.pointer_mut("/general/redirect_url").unwrap() = json!("");
        assert!(validate_schema(&raw, false).is_ok());
    }

    #[test]
    fn booleans_parse_permissively() {
        let mut raw = default_value();
        *raw.pointer_mut("/general/unique_title").unwrap() = json!("yes");
        assert!(validate_schema(&raw, false).unwrap().general.unique_title);

        *raw.pointer_mut("/general/unique_title").unwrap() = json!(0);
        assert!(!validate_schema(&raw, false).unwrap().general.unique_title);

        *raw.pointer_mut("/general/unique_title").unwrap() = json!("maybe");
        assert_eq!(validate_schema(&raw, false), Err(SchemaError::GeneralInvalid));
    }

    #[test]
    fn numeric_strings_accepted_for_limits() {
        let mut raw = default_value();
        *raw.pointer_mut("/fields/max_images").unwrap() = json!("5");
        assert_eq!(validate_schema(&raw, false).unwrap().fields.max_images, 5);
    }

    #[test]
    fn custom_field_list_is_all_or_nothing() {
        let mut raw = default_value();
        *raw.pointer_mut("/fields/custom_fields").unwrap() = json!([
            {"name": "mood", "label": "Mood", "type": "text"},
            {"name": "city", "label": "", "type": "text"},
        ]);
        assert_eq!(validate_schema(&raw, false), Err(SchemaError::FieldsInvalid));

        *raw.pointer_mut("/fields/custom_fields").unwrap() = json!([
            {"name": "mood", "label": "Mood", "type": "text"},
        ]);
        let schema = validate_schema(&raw, false).unwrap();
        assert_eq!(schema.fields.custom_fields.len(), 1);
        assert_eq!(schema.fields.custom_fields[0].name, "mood");
    }

    #[test]
    fn invalid_admin_email_rejects_notifications() {
        let mut raw = default_value();
        *raw.pointer_mut("/notifications/admin_on_submit/email").unwrap() = json!("not-an-address");
        assert_eq!(validate_schema(&raw, false), Err(SchemaError::NotificationsInvalid));

        *raw.pointer_mut("/notifications/admin_on_submit/email").unwrap() = json!("ops@example.org");
        assert!(validate_schema(&raw, false).is_ok());
    }

    #[test]
    fn restricted_html_strips_disallowed_tags_in_templates() {
        let mut raw = default_value();
        *raw.pointer_mut("/notifications/author_on_submit/message").unwrap() =
            json!("<p>Thanks</p><script>x()</script>");
        let schema = validate_schema(&raw, false).unwrap();
        assert!(!schema.notifications.author_on_submit.message.contains("script"));

        let unrestricted = validate_schema(&raw, true).unwrap();
        assert!(unrestricted.notifications.author_on_submit.message.contains("script"));
    }

    #[test]
    fn stored_schema_round_trips() {
        // The settings store keeps the serialized normalized schema; reads
        // deserialize it straight back.
        let schema = default_schema();
        let stored = serde_json::to_string(&schema).unwrap();
        let loaded: crate::models::FormSchema = serde_json::from_str(&stored).unwrap();
        assert_eq!(loaded, schema);
    }

    #[test]
    fn client_view_strips_server_secrets() {
        let mut schema = default_schema();
        schema.security.captcha.secret_key = "shh".to_string();
        schema.security.challenge.response = "42".to_string();
        schema.security.captcha.site_key = "public".to_string();

        let view = client_view(&schema);
        assert!(view.get("notifications").is_none());
        assert_eq!(view.pointer("/security/captcha/secret_key").unwrap(), "");
        assert_eq!(view.pointer("/security/challenge/response").unwrap(), "");
        assert_eq!(view.pointer("/security/captcha/site_key").unwrap(), "public");
    }
}
