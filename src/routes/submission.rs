use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::helper::{content_helpers, notification_helpers, schema_helpers, submission_helpers};
use crate::middleware::{session_user, AuthenticatedUser};
use crate::models::db_operations::{forms_db_operations, records_db_operations, users_db_operations};
use crate::models::{Account, FormSchema, SubmissionPayload};

// --- Request payloads ---
//
// Every POST body carries the anti-forgery token and is rejected by the
// extractor before the handler runs.

#[derive(Deserialize)]
struct FormRequest {
    csrf_token: CsrfToken,
    form_id: i64,
}

impl CsrfGuarded for FormRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct SubmitRequest {
    csrf_token: CsrfToken,
    form_id: i64,
    #[serde(flatten)]
    payload: SubmissionPayload,
}

impl CsrfGuarded for SubmitRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct UpdateRequest {
    csrf_token: CsrfToken,
    post_id: String,
    #[serde(flatten)]
    payload: SubmissionPayload,
}

impl CsrfGuarded for UpdateRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct TrashRequest {
    csrf_token: CsrfToken,
    post_id: String,
}

impl CsrfGuarded for TrashRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct MyPostsRequest {
    csrf_token: CsrfToken,
    paged: u64,
}

impl CsrfGuarded for MyPostsRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/context", web::get().to(submission_context))
        .route("/form", web::post().to(get_form))
        .route("/submit", web::post().to(submit_post))
        .route("/update", web::post().to(update_post))
        .route("/trash", web::post().to(trash_post))
        .route("/my_posts", web::post().to(my_posts));
}

fn db_unavailable() -> HttpResponse {
    HttpResponse::InternalServerError()
        .json(json!({ "success": false, "error": "A database connection error occurred." }))
}

fn load_schema(conn: &rusqlite::Connection, form_id: i64) -> Result<FormSchema, HttpResponse> {
    let row = forms_db_operations::read_form(conn, form_id).ok_or_else(|| {
        HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "Form settings could not be found. Please contact the site operator for assistance.",
        }))
    })?;
    serde_json::from_str(&row.data).map_err(|e| {
        log::error!("Stored settings for form {} failed to deserialize: {}", form_id, e);
        HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": "An error occurred with the form settings data. Please contact the site operator for assistance.",
        }))
    })
}

fn current_account(session: &Session, conn: &rusqlite::Connection) -> Option<Account> {
    session_user(session)
        .and_then(|user| users_db_operations::read_account_by_id(conn, user.user_id))
}

fn validation_rejection(error: submission_helpers::SubmissionError) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "success": false, "error": error.to_string() }))
}

fn materialize_rejection(error: content_helpers::MaterializeError) -> HttpResponse {
    match &error {
        content_helpers::MaterializeError::Persist(source) => {
            log::error!("Record write failed: {}", source);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": error.to_string() }))
        }
        _ => HttpResponse::BadRequest().json(json!({ "success": false, "error": error.to_string() })),
    }
}

/// Issues the anti-forgery token cookie and reports who the session belongs
/// to, so clients can render the right form state.
async fn submission_context(session: Session, token: CsrfToken) -> impl Responder {
    let user = session_user(&session);
    HttpResponse::Ok().json(json!({
        "success": true,
        "csrf_token": token.get(),
        "user": user,
    }))
}

/// Form configuration for rendering: the schema with server-side secrets
/// stripped, plus the taxonomy lists with the schema's exclusions applied.
async fn get_form(
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<FormRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    let schema = match load_schema(&conn, request.form_id) {
        Ok(schema) => schema,
        Err(response) => return response,
    };

    let categories = forms_db_operations::list_categories(&conn, &schema.fields.categories.exclude_ids)
        .unwrap_or_default()
        .into_iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect::<Vec<_>>();
    let tags = forms_db_operations::list_tags(&conn, &schema.fields.tags.exclude).unwrap_or_default();

    HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "id": request.form_id,
            "schema": schema_helpers::client_view(&schema),
            "categories": categories,
            "tags": tags,
        },
    }))
}

async fn submit_post(
    session: Session,
    config: web::Data<Config>,
    client: web::Data<reqwest::Client>,
    db: web::Data<Database>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<SubmitRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    let schema = match load_schema(&conn, request.form_id) {
        Ok(schema) => schema,
        Err(response) => return response,
    };
    let account = current_account(&session, &conn);

    let validated = match submission_helpers::validate_submission(
        &client, &config, &conn, &db, &schema, &request.payload, account.as_ref(), None,
    )
    .await
    {
        Ok(validated) => validated,
        Err(error) => return validation_rejection(error),
    };

    let outcome = match content_helpers::materialize(
        &config, &conn, &db, &schema, request.form_id, &validated, None,
    ) {
        Ok(outcome) => outcome,
        Err(error) => return materialize_rejection(error),
    };

    let account_email = account.as_ref().map(|a| a.email.as_str()).unwrap_or("");
    let author_email =
        notification_helpers::resolve_author_recipient("", &validated.user_email, account_email);
    let notifications = notification_helpers::dispatch_on_submit(
        &client,
        &config,
        &schema,
        &outcome.title,
        &outcome.permalink,
        &author_email,
        true,
        outcome.previous_status,
        outcome.status,
    )
    .await;

    let mut body = json!({
        "success": true,
        "post_id": outcome.record_id,
        "url": outcome.permalink,
        "message": "Your post has been submitted successfully!",
    });
    if !notifications.is_empty() {
        body["email_message"] = json!(notifications);
    }
    HttpResponse::Ok().json(body)
}

async fn update_post(
    user: AuthenticatedUser,
    config: web::Data<Config>,
    client: web::Data<reqwest::Client>,
    db: web::Data<Database>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<UpdateRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };

    // Missing records and foreign records get the same answer.
    let ownership_rejection = || {
        HttpResponse::Forbidden()
            .json(json!({ "success": false, "error": "You are not allowed to edit this post." }))
    };
    let existing = match records_db_operations::read_record(&db, &request.post_id) {
        Some(record) if record.meta.author_id == user.user_id => record,
        _ => return ownership_rejection(),
    };

    let schema = match load_schema(&conn, existing.meta.form_id) {
        Ok(schema) => schema,
        Err(response) => return response,
    };
    let account = users_db_operations::read_account_by_id(&conn, user.user_id);

    let validated = match submission_helpers::validate_submission(
        &client, &config, &conn, &db, &schema, &request.payload, account.as_ref(), Some(&existing),
    )
    .await
    {
        Ok(validated) => validated,
        Err(error) => return validation_rejection(error),
    };

    let outcome = match content_helpers::materialize(
        &config, &conn, &db, &schema, existing.meta.form_id, &validated, Some(&existing),
    ) {
        Ok(outcome) => outcome,
        Err(error) => return materialize_rejection(error),
    };

    let account_email = account.as_ref().map(|a| a.email.as_str()).unwrap_or("");
    let author_email =
        notification_helpers::resolve_author_recipient("", &validated.user_email, account_email);
    let notifications = notification_helpers::dispatch_on_submit(
        &client,
        &config,
        &schema,
        &outcome.title,
        &outcome.permalink,
        &author_email,
        false,
        outcome.previous_status,
        outcome.status,
    )
    .await;

    let mut body = json!({
        "success": true,
        "post_id": outcome.record_id,
        "url": outcome.permalink,
        "message": "Your post has been submitted successfully!",
    });
    if !notifications.is_empty() {
        body["email_message"] = json!(notifications);
    }
    HttpResponse::Ok().json(body)
}

async fn trash_post(
    user: AuthenticatedUser,
    config: web::Data<Config>,
    client: web::Data<reqwest::Client>,
    db: web::Data<Database>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<TrashRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };

    let ownership_rejection = || {
        HttpResponse::Forbidden().json(json!({
            "success": false,
            "error": "Sorry, you are not allowed to delete this post.",
        }))
    };
    let record = match records_db_operations::read_record(&db, &request.post_id) {
        Some(record) if record.meta.author_id == user.user_id => record,
        _ => return ownership_rejection(),
    };

    // The notification goes out before the mutation, with the stored title.
    let mut email_message = None;
    if let Ok(schema) = load_schema(&conn, record.meta.form_id) {
        let account = users_db_operations::read_account_by_id(&conn, user.user_id);
        let stored_email = record
            .author_info
            .as_ref()
            .map(|info| info.user_email.as_str())
            .unwrap_or("");
        let account_email = account.as_ref().map(|a| a.email.as_str()).unwrap_or("");
        let author_email =
            notification_helpers::resolve_author_recipient(stored_email, "", account_email);
        email_message = notification_helpers::dispatch_on_trash(
            &client,
            &config,
            &schema,
            &record.meta.title,
            &config.permalink(&record.id),
            &author_email,
        )
        .await;
    }

    if let Err(e) = records_db_operations::trash_record(&db, &request.post_id) {
        log::error!("Failed to trash record {}: {}", request.post_id, e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": "Failed to delete the post. Please try again or contact the site operator.",
        }));
    }

    let mut body = json!({
        "success": true,
        "message": format!("The post with ID {} has been deleted.", request.post_id),
    });
    if let Some(outcome) = email_message {
        body["email_message"] = json!(outcome);
    }
    HttpResponse::Ok().json(body)
}

async fn my_posts(
    user: AuthenticatedUser,
    config: web::Data<Config>,
    db: web::Data<Database>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<MyPostsRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    if request.paged == 0 {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Page number is empty!" }));
    }
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };

    match content_helpers::list_user_submissions(&config, &conn, &db, user.user_id, request.paged) {
        Ok(listing) => HttpResponse::Ok().json(json!({ "success": true, "data": listing })),
        Err(e) => {
            log::error!("Failed to list submissions for user {}: {}", user.user_id, e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to retrieve posts." }))
        }
    }
}
