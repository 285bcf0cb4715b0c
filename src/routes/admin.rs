use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::helper::schema_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{forms_db_operations, users_db_operations};

// The admin surface is a JSON API for the host's dashboard; every write is
// guarded by the schema validator so only normalized documents reach the
// settings store. Role and IP checks are applied at the scope level.

#[derive(Deserialize)]
struct CreateFormRequest {
    csrf_token: CsrfToken,
    title: String,
    data: Value,
}

impl CsrfGuarded for CreateFormRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct UpdateFormRequest {
    csrf_token: CsrfToken,
    id: i64,
    data: Value,
}

impl CsrfGuarded for UpdateFormRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct DeleteFormRequest {
    csrf_token: CsrfToken,
    id: i64,
}

impl CsrfGuarded for DeleteFormRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct RestoreEntry {
    id: i64,
    title: String,
    data: Value,
}

#[derive(Deserialize)]
struct RestoreRequest {
    csrf_token: CsrfToken,
    data: Vec<RestoreEntry>,
}

impl CsrfGuarded for RestoreRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

#[derive(Deserialize)]
struct TokenOnlyRequest {
    csrf_token: CsrfToken,
}

impl CsrfGuarded for TokenOnlyRequest {
    fn csrf_token(&self) -> &CsrfToken { &self.csrf_token }
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/context", web::get().to(admin_context))
        .route("/forms/create", web::post().to(create_form))
        .route("/forms/update", web::post().to(update_form))
        .route("/forms/delete", web::post().to(delete_form))
        .route("/forms/list", web::post().to(list_forms))
        .route("/forms/restore", web::post().to(restore_forms))
        .route("/authors", web::post().to(list_authors))
        .route("/categories", web::post().to(list_categories))
        .route("/tags", web::post().to(list_tags));
}

fn db_unavailable() -> HttpResponse {
    HttpResponse::InternalServerError()
        .json(json!({ "success": false, "error": "A database connection error occurred." }))
}

async fn admin_context(user: AuthenticatedUser, token: CsrfToken) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "success": true,
        "csrf_token": token.get(),
        "user": user,
    }))
}

async fn create_form(
    config: web::Data<Config>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<CreateFormRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    let title = request.title.trim();
    if title.is_empty() {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Title or data is missing." }));
    }

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    if forms_db_operations::title_exists(&conn, title) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "The form title already exists. Please choose a different title.",
        }));
    }

    let schema = match schema_helpers::validate_schema(&request.data, config.allow_unrestricted_html) {
        Ok(schema) => schema,
        Err(error) => {
            return HttpResponse::BadRequest()
                .json(json!({ "success": false, "error": error.to_string() }))
        }
    };

    let data = match serde_json::to_string(&schema) {
        Ok(data) => data,
        Err(e) => {
            log::error!("Failed to serialize a validated schema: {}", e);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to save to the database." }));
        }
    };
    match forms_db_operations::create_form(&conn, title, &data) {
        Ok(id) => HttpResponse::Ok()
            .json(json!({ "success": true, "id": id, "message": "Save successfully!" })),
        Err(e) => {
            log::error!("Failed to create form '{}': {}", title, e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to save to the database." }))
        }
    }
}

async fn update_form(
    config: web::Data<Config>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<UpdateFormRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };

    let schema = match schema_helpers::validate_schema(&request.data, config.allow_unrestricted_html) {
        Ok(schema) => schema,
        Err(error) => {
            return HttpResponse::BadRequest()
                .json(json!({ "success": false, "error": error.to_string() }))
        }
    };

    let data = match serde_json::to_string(&schema) {
        Ok(data) => data,
        Err(e) => {
            log::error!("Failed to serialize a validated schema: {}", e);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Save to Database failed." }));
        }
    };
    match forms_db_operations::update_form_data(&conn, request.id, &data) {
        Ok(0) => HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "Save to Database failed." })),
        Ok(_) => HttpResponse::Ok().json(json!({ "success": true, "message": "Save successfully!" })),
        Err(e) => {
            log::error!("Failed to update form {}: {}", request.id, e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Save to Database failed." }))
        }
    }
}

async fn delete_form(
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<DeleteFormRequest>>,
) -> impl Responder {
    let request = request.into_inner();
    if request.id <= 0 {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "error": "ID is missing" }));
    }
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    match forms_db_operations::delete_form(&conn, request.id) {
        Ok(_) => HttpResponse::Ok()
            .json(json!({ "success": true, "message": "Removed successfully!" })),
        Err(e) => {
            log::error!("Failed to delete form {}: {}", request.id, e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to delete the form." }))
        }
    }
}

async fn list_forms(
    pool: web::Data<crate::DbPool>,
    _request: Csrf<web::Json<TokenOnlyRequest>>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    match forms_db_operations::read_all_forms(&conn) {
        Ok(rows) => {
            let forms = rows
                .into_iter()
                .map(|row| {
                    let data =
                        serde_json::from_str::<Value>(&row.data).unwrap_or(Value::Null);
                    json!({ "id": row.id, "title": row.title, "data": data })
                })
                .collect::<Vec<_>>();
            HttpResponse::Ok().json(json!({ "success": true, "data": forms }))
        }
        Err(e) => {
            log::error!("Failed to list forms: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "No records found" }))
        }
    }
}

/// Bulk import keyed by id; rows that would collide with an existing id are
/// left untouched. Every entry must validate before anything is written.
async fn restore_forms(
    config: web::Data<Config>,
    pool: web::Data<crate::DbPool>,
    request: Csrf<web::Json<RestoreRequest>>,
) -> impl Responder {
    let request = request.into_inner();

    let mut rows = Vec::with_capacity(request.data.len());
    for entry in &request.data {
        if entry.id <= 0 || entry.title.trim().is_empty() {
            return HttpResponse::BadRequest()
                .json(json!({ "success": false, "error": "ID or Title is missing" }));
        }
        let schema = match schema_helpers::validate_schema(&entry.data, config.allow_unrestricted_html)
        {
            Ok(schema) => schema,
            Err(error) => {
                return HttpResponse::BadRequest()
                    .json(json!({ "success": false, "error": error.to_string() }))
            }
        };
        match serde_json::to_string(&schema) {
            Ok(data) => rows.push((entry.id, entry.title.trim().to_string(), data)),
            Err(e) => {
                log::error!("Failed to serialize a validated schema: {}", e);
                return HttpResponse::InternalServerError()
                    .json(json!({ "success": false, "error": "Restore data failed." }));
            }
        }
    }

    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    match forms_db_operations::restore_forms(&mut conn, &rows) {
        Ok(()) => HttpResponse::Ok()
            .json(json!({ "success": true, "message": "Restore data success." })),
        Err(e) => {
            log::error!("Failed to restore forms: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Restore data failed." }))
        }
    }
}

/// Account list for the form builder's fallback-author picker.
async fn list_authors(
    pool: web::Data<crate::DbPool>,
    _request: Csrf<web::Json<TokenOnlyRequest>>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    match users_db_operations::read_all_accounts(&conn) {
        Ok(accounts) => {
            let authors = accounts
                .into_iter()
                .map(|account| json!({ "id": account.id, "display_name": account.display_name }))
                .collect::<Vec<_>>();
            HttpResponse::Ok().json(json!({ "success": true, "data": authors }))
        }
        Err(e) => {
            log::error!("Failed to list accounts: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to retrieve authors." }))
        }
    }
}

async fn list_categories(
    pool: web::Data<crate::DbPool>,
    _request: Csrf<web::Json<TokenOnlyRequest>>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    match forms_db_operations::list_categories(&conn, &[]) {
        Ok(categories) => {
            let data = categories
                .into_iter()
                .map(|(id, name)| json!({ "id": id, "name": name }))
                .collect::<Vec<_>>();
            HttpResponse::Ok().json(json!({ "success": true, "data": data }))
        }
        Err(e) => {
            log::error!("Failed to list categories: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to retrieve categories." }))
        }
    }
}

async fn list_tags(
    pool: web::Data<crate::DbPool>,
    _request: Csrf<web::Json<TokenOnlyRequest>>,
) -> impl Responder {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => return db_unavailable(),
    };
    match forms_db_operations::list_tags(&conn, &[]) {
        Ok(tags) => HttpResponse::Ok().json(json!({ "success": true, "data": tags })),
        Err(e) => {
            log::error!("Failed to list tags: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Failed to retrieve tags." }))
        }
    }
}
