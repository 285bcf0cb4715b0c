pub mod content_helpers;
pub mod notification_helpers;
pub mod sanitization_helpers;
pub mod schema_helpers;
pub mod submission_helpers;
