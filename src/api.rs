//
// HTTP surface: six endpoints wiring the request guards onto the auth
// flow coordinator and token engine.
//
use macros::UuidFromParam;
use rocket::{get, post, serde::json::Json, State};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::{self, ClientIp, LoginRequired, TokenKind, UserAgent},
    auth_flow,
    cache::Cache,
    db::DbConn,
    error::Error,
    ratelimit,
    realm::Realm,
    token_engine::{self, TokenPair},
    util::normalize_phone,
};

fn encode_pair(pair: &TokenPair) -> Result<Value, Error> {
    let access_token = auth::encode_token(
        pair.access.jti,
        pair.access.user_id,
        pair.access.realm(),
        pair.access.business_code.as_deref(),
        pair.access.issued_at,
        pair.access.expires_at,
        TokenKind::Access,
    )?;
    let refresh_token = auth::encode_token(
        pair.refresh.jti,
        pair.refresh.user_id,
        pair.refresh.realm(),
        pair.refresh.business_code.as_deref(),
        pair.refresh.issued_at,
        pair.refresh.expires_at,
        TokenKind::Refresh,
    )?;
    Ok(json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
    }))
}

#[derive(Deserialize)]
pub struct AuthRequest {
    phone: String,
    realm: Realm,
    password: Option<String>,
    business: Option<String>,
}

/// `POST /auth`: mobile triggers an OTP send, web performs a password login.
#[post("/auth", data = "<body>")]
pub async fn auth(body: Json<AuthRequest>, ip: ClientIp, ua: UserAgent, cache: &State<Cache>, conn: DbConn) -> Result<Value, Error> {
    if let Some(ip) = ip.0 {
        ratelimit::check_limit_auth(&ip)?;
    }

    let phone = match normalize_phone(&body.phone) {
        Some(phone) => phone,
        None => err_bad_request!("Invalid phone number"),
    };

    match body.realm {
        Realm::Mobile => {
            let business = match body.business.as_deref() {
                Some(business) => business,
                None => err_bad_request!("BusinessIDRequired"),
            };
            auth_flow::mobile_otp_start(&phone, business, cache, &conn).await?;
            Ok(json!({"success": true, "message": "OTP sent successfully."}))
        }
        Realm::Web => {
            let password = match body.password.as_deref() {
                Some(password) => password,
                None => err_bad_request!("Password is required"),
            };
            let ip_str = ip.0.map(|ip| ip.to_string());
            let (user, business, tokens) =
                auth_flow::web_password_login(&phone, password, ip_str.as_deref(), ua.0.as_deref(), cache, &conn).await?;
            Ok(json!({"user": user, "business": business, "tokens": encode_pair(&tokens)?}))
        }
    }
}

#[derive(Deserialize)]
pub struct AuthConfirmRequest {
    phone: String,
    otp: String,
    business: String,
}

/// `POST /auth/confirm`: the otp-context check is body-dependent, so
/// Rocket can't run it as a request guard (those fire before the body is
/// parsed) -- `mobile_otp_confirm`'s own first step *is* that check, since
/// both need the same live-OTP lookup.
#[post("/auth/confirm", data = "<body>")]
pub async fn auth_confirm(body: Json<AuthConfirmRequest>, ip: ClientIp, ua: UserAgent, cache: &State<Cache>, conn: DbConn) -> Result<Value, Error> {
    let phone = match normalize_phone(&body.phone) {
        Some(phone) => phone,
        None => err_bad_request!("Invalid phone number"),
    };

    let ip_str = ip.0.map(|ip| ip.to_string());
    let (client, tokens) = auth_flow::mobile_otp_confirm(&phone, &body.otp, &body.business, ip_str.as_deref(), ua.0.as_deref(), cache, &conn).await?;

    Ok(json!({"client": client, "tokens": encode_pair(&tokens)?}))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

/// `POST /tokens/refresh`.
#[post("/tokens/refresh", data = "<body>")]
pub async fn refresh(body: Json<RefreshRequest>, ip: ClientIp, ua: UserAgent, cache: &State<Cache>, conn: DbConn) -> Result<Value, Error> {
    if let Some(ip) = ip.0 {
        ratelimit::check_limit_auth(&ip)?;
    }

    let claims = auth::decode_token(&body.refresh_token, false)?;
    if claims.kind != TokenKind::Refresh {
        err_bad_request!("Not a valid refresh token");
    }

    let ip_str = ip.0.map(|ip| ip.to_string());
    let pair = token_engine::refresh(claims.jti, ip_str.as_deref(), ua.0.as_deref(), cache, &conn).await?;
    Ok(encode_pair(&pair)?)
}

/// `POST /tokens/logout`: revokes the caller's current access token.
#[post("/tokens/logout")]
pub async fn logout(login: LoginRequired, cache: &State<Cache>, conn: DbConn) -> Result<Value, Error> {
    if let Some(access) = &login.0.access_token {
        token_engine::revoke_access(access, cache, &conn).await?;
    }
    Ok(json!({"success": true, "message": "Logged out."}))
}

#[derive(UuidFromParam)]
pub struct JtiParam(String);

/// `POST /tokens/{jti}/revoke`.
#[post("/tokens/<jti>/revoke")]
pub async fn revoke(jti: JtiParam, login: LoginRequired, cache: &State<Cache>, conn: DbConn) -> Result<Value, Error> {
    let jti = match Uuid::parse_str(&jti.0) {
        Ok(jti) => jti,
        Err(_) => err_bad_request!("Not a token"),
    };
    let user_id = login.0.user.as_ref().map(|u| u.id).unwrap_or_default();
    let revoked = token_engine::user_revokes_by_jti(user_id, jti, cache, &conn).await?;
    Ok(json!({"success": revoked, "message": if revoked { "Revoked." } else { "Not a token." }}))
}

/// `GET /tokens?page=&per_page=`.
#[get("/tokens?<page>&<per_page>")]
pub async fn list_tokens(page: Option<i64>, per_page: Option<i64>, login: LoginRequired, conn: DbConn) -> Result<Value, Error> {
    let ctx = login.0;
    let user = ctx.user.as_ref().expect("LoginRequired guarantees Some(user)");
    let realm = ctx.realm().unwrap_or(Realm::Web);
    let business_code = ctx.business.as_ref().map(|b| b.code.as_str());

    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let tokens = token_engine::list(user.id, realm, business_code, per_page, offset, &conn).await;
    let total = token_engine::count(user.id, realm, business_code, &conn).await;

    Ok(json!({
        "page": page,
        "per_page": per_page,
        "on_page": tokens.len(),
        "total": total,
        "tokens": tokens,
    }))
}

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![auth, auth_confirm, refresh, logout, revoke, list_tokens]
}
