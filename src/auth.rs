//
// Token codec, request context, and realm/role guards.
//
// The codec is a pure function over a token row: it verifies signature and
// expiry only, never revocation -- revocation is only authoritative from the
// store/cache. The request context lazily resolves caller identity
// once per request and memoizes it via Rocket's request-local cache; every
// guard below reads through that single resolution.
//
use std::net::IpAddr;

use chrono::{NaiveDateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    cache::Cache,
    db::{
        models::{AccessToken, Business, Client, User},
        DbConn,
    },
    error::Error,
    realm::Realm,
    token_engine, CONFIG,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// The envelope carried by a bearer credential. Claim names match the wire
/// format exactly; `type` is renamed from `kind` to avoid shadowing
/// the Rust keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub jti: Uuid,
    pub user_id: i64,
    pub realm: Realm,
    pub business_code: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

/// Encodes a signed envelope for one token row. `issued_at`/`expires_at` are
/// the row's own timestamps, not "now" -- this stays a pure function of its
/// arguments.
pub fn encode_token(
    jti: Uuid,
    user_id: i64,
    realm: Realm,
    business_code: Option<&str>,
    issued_at: NaiveDateTime,
    expires_at: NaiveDateTime,
    kind: TokenKind,
) -> Result<String, Error> {
    let claims = TokenClaims {
        jti,
        user_id,
        realm,
        business_code: business_code.map(str::to_string),
        issued_at: issued_at.and_utc().timestamp(),
        expires_at: expires_at.and_utc().timestamp(),
        kind,
    };
    let key = EncodingKey::from_secret(CONFIG.token_secret().as_bytes());
    Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
}

/// Verifies signature unconditionally; verifies expiry unless `allow_expired`
/// is set. The claims use `expires_at`/`issued_at`, not the registered
/// `exp`/`iat` names, so `jsonwebtoken`'s own expiry check is disabled and
/// done by hand against the same field the envelope documents.
pub fn decode_token(token: &str, allow_expired: bool) -> Result<TokenClaims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    let key = DecodingKey::from_secret(CONFIG.token_secret().as_bytes());
    let data = decode::<TokenClaims>(token, &key, &validation)?;
    let claims = data.claims;

    if !allow_expired && claims.expires_at <= Utc::now().timestamp() {
        err_unauthorized!("Invalid or expired token");
    }
    Ok(claims)
}

fn bearer_token(request: &Request<'_>) -> Option<String> {
    let header = request.headers().get_one("Authorization")?;
    header.strip_prefix("Bearer ").map(str::trim).map(str::to_string)
}

/// Request context: `jwt_payload` -> `access_token` -> `user` ->
/// `business` -> `client`, each produced lazily and idempotently, `None` on
/// any break in the chain.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub jwt_payload: Option<TokenClaims>,
    pub access_token: Option<AccessToken>,
    pub user: Option<User>,
    pub business: Option<Business>,
    pub client: Option<Client>,
}

impl RequestContext {
    pub fn realm(&self) -> Option<Realm> {
        self.jwt_payload.as_ref().map(|c| c.realm)
    }
}

async fn build_context(request: &Request<'_>) -> RequestContext {
    let cache = match request.rocket().state::<Cache>() {
        Some(cache) => cache.clone(),
        None => Cache::disconnected(),
    };
    let db = match request.guard::<DbConn>().await {
        Outcome::Success(db) => db,
        _ => return RequestContext::default(),
    };

    let jwt_payload = bearer_token(request).and_then(|token| decode_token(&token, false).ok());

    let access_token = match &jwt_payload {
        Some(claims) if claims.kind == TokenKind::Access => token_engine::get_access(claims.jti, true, &cache, &db).await,
        _ => None,
    };

    let user = match &access_token {
        Some(token) => User::find_by_id_cached(token.user_id, &cache, &db).await,
        None => None,
    };

    let business = match access_token.as_ref().and_then(|token| token.business_code.clone()) {
        Some(code) => Business::find_by_code_cached(&code, &cache, &db).await,
        None => None,
    };

    let client = match (&user, &business) {
        (Some(user), Some(business)) => Client::find_cached(user.id, &business.code, &cache, &db).await,
        _ => None,
    };

    RequestContext {
        jwt_payload,
        access_token,
        user,
        business,
        client,
    }
}

/// Resolves (and memoizes, via Rocket's request-local cache) the context for
/// this request. Never fails -- a broken resolution chain just yields `None`
/// fields, so every guard below reads this once and branches on its content.
async fn context(request: &Request<'_>) -> RequestContext {
    request.local_cache_async(build_context(request)).await.clone()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestContext {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(context(request).await)
    }
}

/// Login-required guard: `user != none`.
pub struct LoginRequired(pub RequestContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for LoginRequired {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ctx = context(request).await;
        if ctx.user.is_some() {
            Outcome::Success(LoginRequired(ctx))
        } else {
            Outcome::Error((Status::Unauthorized, Error::Unauthorized("Login required".into())))
        }
    }
}

/// Business-scoped guard: `business_code != none`.
pub struct BusinessScoped(pub RequestContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BusinessScoped {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ctx = context(request).await;
        if ctx.user.is_none() {
            return Outcome::Error((Status::Unauthorized, Error::Unauthorized("Login required".into())));
        }
        if ctx.business.is_some() {
            Outcome::Success(BusinessScoped(ctx))
        } else {
            Outcome::Error((Status::BadRequest, Error::BadRequest("BusinessIDRequired".into())))
        }
    }
}

/// Admin guard: `user.is_admin`.
pub struct AdminUser(pub RequestContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ctx = context(request).await;
        match &ctx.user {
            Some(user) if user.is_admin => Outcome::Success(AdminUser(ctx)),
            Some(_) => Outcome::Error((Status::Forbidden, Error::Forbidden("Admin only".into()))),
            None => Outcome::Error((Status::Unauthorized, Error::Unauthorized("Login required".into()))),
        }
    }
}

/// Realm=web route gate.
pub struct WebRealm(pub RequestContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WebRealm {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ctx = context(request).await;
        match ctx.realm() {
            None => Outcome::Error((Status::Unauthorized, Error::Unauthorized("Missing or invalid token".into()))),
            Some(Realm::Web) => Outcome::Success(WebRealm(ctx)),
            Some(Realm::Mobile) => Outcome::Error((Status::Forbidden, Error::Forbidden("Wrong realm".into()))),
        }
    }
}

/// Realm=mobile route gate.
pub struct MobileRealm(pub RequestContext);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for MobileRealm {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ctx = context(request).await;
        match ctx.realm() {
            None => Outcome::Error((Status::Unauthorized, Error::Unauthorized("Missing or invalid token".into()))),
            Some(Realm::Mobile) => Outcome::Success(MobileRealm(ctx)),
            Some(Realm::Web) => Outcome::Error((Status::Forbidden, Error::Forbidden("Wrong realm".into()))),
        }
    }
}

/// Caller's IP, preferring a reverse-proxy header -- this is request data,
/// not process state -- over Rocket's socket address.
pub struct ClientIp(pub Option<IpAddr>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let from_header = if CONFIG.ip_header_enabled() {
            request
                .headers()
                .get_one(CONFIG.ip_header())
                .and_then(|value| value.split(',').next())
                .and_then(|value| value.trim().parse::<IpAddr>().ok())
        } else {
            None
        };
        Outcome::Success(ClientIp(from_header.or_else(|| request.client_ip())))
    }
}

/// The caller's `User-Agent`, recorded on issued access tokens.
pub struct UserAgent(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserAgent {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(UserAgent(request.headers().get_one("User-Agent").map(str::to_string)))
    }
}
