use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::models::{AdminNotificationChannel, FormSchema, PostStatus};

/// The substitution pass has always covered the mail headers along with
/// subject and body. That scope is preserved for template compatibility;
/// flip this to narrow it without touching the call sites.
pub const SUBSTITUTE_PLACEHOLDERS_IN_HEADERS: bool = true;

const PLACEHOLDER_TITLE: &str = "{{post_title}}";
const PLACEHOLDER_LINK: &str = "{{post_link}}";

const MAIL_HEADERS: [&str; 1] = ["Content-Type: text/html; charset=UTF-8"];

const SUBJECT_PREFIX_NEW: &str = "[NEW POST]: ";
const SUBJECT_PREFIX_EDITED: &str = "[POST EDITED]: ";
const SUBJECT_PREFIX_TRASHED: &str = "[POST TRASHED]: ";

const ADMIN_MAIL_SENT: &str = "Admin mail was sent successfully.";
const ADMIN_MAIL_FAILED: &str = "Admin mail sending failed.";
const USER_MAIL_SENT: &str = "User mail was sent successfully.";
const USER_MAIL_FAILED: &str = "User mail sending failed.";
const USER_EMAIL_EMPTY: &str = "The user email address is empty.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub headers: Vec<String>,
}

/// Literal find-replace of the template placeholders.
pub fn apply_placeholders(template: &str, title: &str, link: &str) -> String {
    template
        .replace(PLACEHOLDER_TITLE, title)
        .replace(PLACEHOLDER_LINK, link)
}

pub fn build_mail(
    to: &str,
    subject_prefix: Option<&str>,
    subject: &str,
    message: &str,
    title: &str,
    link: &str,
) -> OutgoingMail {
    let subject = match subject_prefix {
        Some(prefix) => format!("{}{}", prefix, subject),
        None => subject.to_string(),
    };
    let headers = MAIL_HEADERS
        .iter()
        .map(|header| {
            if SUBSTITUTE_PLACEHOLDERS_IN_HEADERS {
                apply_placeholders(header, title, link)
            } else {
                header.to_string()
            }
        })
        .collect();
    OutgoingMail {
        to: to.to_string(),
        subject: apply_placeholders(&subject, title, link),
        body: apply_placeholders(message, title, link),
        headers,
    }
}

/// Admin channel recipient: explicit configured address, else the platform
/// admin address.
pub fn resolve_admin_recipient(channel: &AdminNotificationChannel, config: &Config) -> String {
    if channel.email.is_empty() {
        config.admin_email.clone()
    } else {
        channel.email.clone()
    }
}

/// Author channel recipient: stored author-info address, else the submitting
/// session's address, else the platform account's address.
pub fn resolve_author_recipient(stored: &str, submitter: &str, account: &str) -> String {
    if !stored.is_empty() {
        stored.to_string()
    } else if !submitter.is_empty() {
        submitter.to_string()
    } else {
        account.to_string()
    }
}

/// Hands one message to the HTTP mail gateway. Failures only affect the
/// per-channel outcome; the submission that triggered the mail has already
/// committed.
pub async fn send_mail(client: &reqwest::Client, gateway_url: &str, mail: &OutgoingMail) -> bool {
    if gateway_url.is_empty() {
        log::warn!("Mail gateway is not configured; dropping notification to {}", mail.to);
        return false;
    }
    let payload = json!({
        "to": mail.to,
        "subject": mail.subject,
        "html": mail.body,
        "headers": mail.headers,
    });
    match client.post(gateway_url).json(&payload).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            log::warn!("Mail gateway rejected notification to {}: {}", mail.to, response.status());
            false
        }
        Err(e) => {
            log::warn!("Mail gateway request failed: {}", e);
            false
        }
    }
}

/// Per-channel delivery outcomes returned to the caller for transparency.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct NotificationOutcomes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_submitted_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_published_message: Option<String>,
}

impl NotificationOutcomes {
    pub fn is_empty(&self) -> bool {
        self.admin_message.is_none()
            && self.user_submitted_message.is_none()
            && self.user_published_message.is_none()
    }
}

/// Fires after a create or edit has committed. Fans out to the admin and
/// author channels, plus the publish channel when this write moved the record
/// into the published status for the first time.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch_on_submit(
    client: &reqwest::Client,
    config: &Config,
    schema: &FormSchema,
    title: &str,
    link: &str,
    author_email: &str,
    is_new_post: bool,
    previous_status: Option<PostStatus>,
    status: PostStatus,
) -> NotificationOutcomes {
    let mut outcomes = NotificationOutcomes::default();

    let admin = &schema.notifications.admin_on_submit;
    if admin.enabled {
        let mail = build_mail(
            &resolve_admin_recipient(admin, config),
            None,
            &admin.subject,
            &admin.message,
            title,
            link,
        );
        let sent = send_mail(client, &config.mail_gateway_url, &mail).await;
        outcomes.admin_message =
            Some(if sent { ADMIN_MAIL_SENT } else { ADMIN_MAIL_FAILED }.to_string());
    }

    let on_submit = &schema.notifications.author_on_submit;
    if on_submit.enabled {
        outcomes.user_submitted_message = Some(if author_email.is_empty() {
            USER_EMAIL_EMPTY.to_string()
        } else {
            let prefix = if is_new_post { SUBJECT_PREFIX_NEW } else { SUBJECT_PREFIX_EDITED };
            let mail = build_mail(
                author_email,
                Some(prefix),
                &on_submit.subject,
                &on_submit.message,
                title,
                link,
            );
            let sent = send_mail(client, &config.mail_gateway_url, &mail).await;
            if sent { USER_MAIL_SENT } else { USER_MAIL_FAILED }.to_string()
        });
    }

    // Publish fires only on the transition into the published status; a
    // published record edited in place stays quiet.
    let on_publish = &schema.notifications.author_on_publish;
    if on_publish.enabled
        && status == PostStatus::Publish
        && previous_status != Some(PostStatus::Publish)
    {
        outcomes.user_published_message = Some(if author_email.is_empty() {
            USER_EMAIL_EMPTY.to_string()
        } else {
            let mail = build_mail(
                author_email,
                None,
                &on_publish.subject,
                &on_publish.message,
                title,
                link,
            );
            let sent = send_mail(client, &config.mail_gateway_url, &mail).await;
            if sent { USER_MAIL_SENT } else { USER_MAIL_FAILED }.to_string()
        });
    }

    outcomes
}

/// Fires before the soft-delete mutation, with the stored title, since the
/// record may no longer be reachable afterwards.
pub async fn dispatch_on_trash(
    client: &reqwest::Client,
    config: &Config,
    schema: &FormSchema,
    title: &str,
    link: &str,
    author_email: &str,
) -> Option<String> {
    let channel = &schema.notifications.author_on_trash;
    if !channel.enabled {
        return None;
    }
    if author_email.is_empty() {
        return Some(USER_EMAIL_EMPTY.to_string());
    }
    let mail = build_mail(
        author_email,
        Some(SUBJECT_PREFIX_TRASHED),
        &channel.subject,
        &channel.message,
        title,
        link,
    );
    let sent = send_mail(client, &config.mail_gateway_url, &mail).await;
    Some(if sent { USER_MAIL_SENT } else { USER_MAIL_FAILED }.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebConfig;
    use crate::helper::schema_helpers::default_schema;

    fn test_config() -> Config {
        Config {
            web: WebConfig { host: "127.0.0.1".to_string(), port: 0 },
            database_path: "/tmp/unused".to_string(),
            media_path: "/tmp/unused".to_string(),
            base_url: "https://site.test".to_string(),
            allowed_origins: String::new(),
            log_level: "info".to_string(),
            session_secret_key: String::new(),
            admin_url_prefix: "manage".to_string(),
            use_secure_cookies: false,
            admin_email: "admin@site.test".to_string(),
            // Empty gateway: every send reports failure without any network.
            mail_gateway_url: String::new(),
            captcha_verify_url: String::new(),
            outbound_timeout_secs: 10,
            enable_post_views: false,
            allow_unrestricted_html: false,
        }
    }

    #[test]
    fn placeholders_replace_literally() {
        let out = apply_placeholders(
            "Post {{post_title}} at {{post_link}} ({{post_title}})",
            "Alpha",
            "https://site.test/p/1",
        );
        assert_eq!(out, "Post Alpha at https://site.test/p/1 (Alpha)");
    }

    #[test]
    fn build_mail_applies_prefix_and_substitution_everywhere() {
        let mail = build_mail(
            "maria@example.org",
            Some(SUBJECT_PREFIX_NEW),
            "{{post_title}} submitted",
            "See {{post_link}}",
            "Alpha",
            "https://site.test/p/1",
        );
        assert_eq!(mail.subject, "[NEW POST]: Alpha submitted");
        assert_eq!(mail.body, "See https://site.test/p/1");
        assert_eq!(mail.headers, vec!["Content-Type: text/html; charset=UTF-8".to_string()]);
    }

    #[test]
    fn admin_recipient_falls_back_to_platform_address() {
        let config = test_config();
        let mut channel = default_schema().notifications.admin_on_submit;
        assert_eq!(resolve_admin_recipient(&channel, &config), "admin@site.test");
        channel.email = "ops@example.org".to_string();
        assert_eq!(resolve_admin_recipient(&channel, &config), "ops@example.org");
    }

    #[test]
    fn author_recipient_resolution_order() {
        assert_eq!(resolve_author_recipient("stored@x.org", "sess@x.org", "acct@x.org"), "stored@x.org");
        assert_eq!(resolve_author_recipient("", "sess@x.org", "acct@x.org"), "sess@x.org");
        assert_eq!(resolve_author_recipient("", "", "acct@x.org"), "acct@x.org");
    }

    #[actix_web::test]
    async fn channels_gate_independently() {
        let config = test_config();
        let client = reqwest::Client::new();
        let mut schema = default_schema();
        schema.notifications.admin_on_submit.enabled = true;

        let outcomes = dispatch_on_submit(
            &client, &config, &schema, "Alpha", "https://site.test/p/1",
            "maria@example.org", true, None, PostStatus::Draft,
        )
        .await;
        assert_eq!(outcomes.admin_message.as_deref(), Some("Admin mail sending failed."));
        assert!(outcomes.user_submitted_message.is_none());
        assert!(outcomes.user_published_message.is_none());
    }

    #[actix_web::test]
    async fn publish_channel_fires_only_on_transition() {
        let config = test_config();
        let client = reqwest::Client::new();
        let mut schema = default_schema();
        schema.notifications.author_on_publish.enabled = true;

        // draft -> publish fires.
        let outcomes = dispatch_on_submit(
            &client, &config, &schema, "Alpha", "https://site.test/p/1",
            "maria@example.org", false, Some(PostStatus::Draft), PostStatus::Publish,
        )
        .await;
        assert!(outcomes.user_published_message.is_some());

        // publish -> publish stays quiet.
        let outcomes = dispatch_on_submit(
            &client, &config, &schema, "Alpha", "https://site.test/p/1",
            "maria@example.org", false, Some(PostStatus::Publish), PostStatus::Publish,
        )
        .await;
        assert!(outcomes.user_published_message.is_none());

        // A record created directly as published also fires.
        let outcomes = dispatch_on_submit(
            &client, &config, &schema, "Alpha", "https://site.test/p/1",
            "maria@example.org", true, None, PostStatus::Publish,
        )
        .await;
        assert!(outcomes.user_published_message.is_some());
    }

    #[actix_web::test]
    async fn trash_channel_respects_flag_and_missing_recipient() {
        let config = test_config();
        let client = reqwest::Client::new();
        let mut schema = default_schema();

        assert!(dispatch_on_trash(&client, &config, &schema, "Alpha", "link", "a@x.org").await.is_none());

        schema.notifications.author_on_trash.enabled = true;
        assert_eq!(
            dispatch_on_trash(&client, &config, &schema, "Alpha", "link", "").await.as_deref(),
            Some("The user email address is empty.")
        );
        assert_eq!(
            dispatch_on_trash(&client, &config, &schema, "Alpha", "link", "a@x.org").await.as_deref(),
            Some("User mail sending failed.")
        );
    }
}
