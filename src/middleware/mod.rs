use actix_web::{dev, guard, FromRequest, HttpRequest};
use actix_session::SessionExt;
use actix_session::Session;
use serde::Serialize;
use std::env;
use std::future::{ready, Ready};

/// Identity the host platform's login flow wrote into the session. This
/// service only ever reads it.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub role: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        match (
            session.get::<i64>("user_id"),
            session.get::<String>("username"),
            session.get::<String>("role"),
        ) {
            (Ok(Some(user_id)), Ok(Some(username)), Ok(Some(role))) => {
                ready(Ok(AuthenticatedUser { user_id, username, role }))
            }
            _ => ready(Err(actix_web::error::ErrorUnauthorized(
                "You need to log in before do this action.",
            ))),
        }
    }
}

/// Reads the session identity without rejecting anonymous callers.
pub fn session_user(session: &Session) -> Option<AuthenticatedUser> {
    let user_id = session.get::<i64>("user_id").ok().flatten()?;
    let username = session.get::<String>("username").ok().flatten()?;
    let role = session.get::<String>("role").ok().flatten()?;
    Some(AuthenticatedUser { user_id, username, role })
}

pub fn admin_guard(session: &Session) -> bool {
    session.get::<String>("role").unwrap_or(None) == Some("admin".to_string())
}

/// Allow-list guard for the management surface. `ADMIN_ACCEPT_IP` holds a
/// comma-separated list, or `*` to accept everyone.
pub fn ip_guard(ctx: &guard::GuardContext) -> bool {
    let allowed_ips_str = match env::var("ADMIN_ACCEPT_IP") {
        Ok(val) => val,
        Err(_) => {
            log::warn!("ADMIN_ACCEPT_IP is not set. Denying all management requests.");
            return false;
        }
    };

    if allowed_ips_str.trim() == "*" {
        return true;
    }

    // Take the real IP, considering reverse proxies.
    let request_ip = ctx
        .head()
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| ctx.head().peer_addr.map(|addr| addr.ip().to_string()));

    let peer_addr = match request_ip {
        Some(ip) => ip,
        None => {
            log::warn!("Could not determine peer IP address for a management request.");
            return false;
        }
    };

    let is_allowed = allowed_ips_str.split(',').any(|ip| ip.trim() == peer_addr);

    if !is_allowed {
        log::warn!("Blocked management request from unauthorized IP: {}", peer_addr);
    }

    is_allowed
}
