//
// Token engine: pair issuance, refresh rotation, cascading revocation,
// listing, cache coherence. Every multi-statement flow (issue,
// refresh) runs inside one transaction before the results are cached.
//
use chrono::{Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    cache::Cache,
    db::{
        models::{
            token::{NewAccessToken, NewRefreshToken},
            AccessToken, Business, RefreshToken,
        },
        schema::{access_tokens, refresh_tokens},
        DbConn,
    },
    error::{Error, MapResult},
    realm::Realm,
    CONFIG,
};

/// A freshly issued or rotated pair.
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

/// Issue. Enforces the mobile-requires/web-forbids `business_code`
/// invariant and checks business existence (cache-through) before inserting.
pub async fn issue(
    user_id: i64,
    realm: Realm,
    business_code: Option<&str>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    cache: &Cache,
    conn: &DbConn,
) -> Result<TokenPair, Error> {
    match (realm, business_code) {
        (Realm::Mobile, None) => err_bad_request!("business is required for mobile tokens"),
        (Realm::Web, Some(_)) => err_bad_request!("business must not be set for web tokens"),
        _ => {}
    }

    if let Some(code) = business_code {
        if Business::find_by_code_cached(code, cache, conn).await.is_none() {
            err_not_found!("Business does not exist");
        }
    }

    let realm_str = realm.as_str().to_string();
    let business_code = business_code.map(str::to_string);
    let ip_address = ip_address.map(str::to_string);
    let user_agent = user_agent.map(str::to_string);
    let access_ttl = Duration::seconds(CONFIG.access_token_ttl_secs());
    let refresh_ttl = Duration::seconds(CONFIG.refresh_token_ttl_secs());

    let pair: Result<(AccessToken, RefreshToken), Error> = db_run! {conn: {
        conn.transaction::<(AccessToken, RefreshToken), Error, _>(|conn| {
            let now = Utc::now().naive_utc();
            let refresh_jti = Uuid::new_v4();
            let access_jti = Uuid::new_v4();

            let refresh = diesel::insert_into(refresh_tokens::table)
                .values(&NewRefreshToken {
                    jti: refresh_jti,
                    user_id,
                    realm: &realm_str,
                    business_code: business_code.as_deref(),
                    issued_at: now,
                    expires_at: now + refresh_ttl,
                })
                .get_result::<RefreshToken>(conn)
                .map_res("Error creating refresh token")?;

            let access = diesel::insert_into(access_tokens::table)
                .values(&NewAccessToken {
                    jti: access_jti,
                    user_id,
                    realm: &realm_str,
                    business_code: business_code.as_deref(),
                    ip_address: ip_address.as_deref(),
                    user_agent: user_agent.as_deref(),
                    issued_at: now,
                    expires_at: now + access_ttl,
                    refresh_token_jti: Some(refresh_jti),
                })
                .get_result::<AccessToken>(conn)
                .map_res("Error creating access token")?;

            let refresh = diesel::update(refresh_tokens::table.filter(refresh_tokens::jti.eq(refresh_jti)))
                .set(refresh_tokens::access_token_jti.eq(access_jti))
                .get_result::<RefreshToken>(conn)
                .map_res("Error linking refresh token")?;

            Ok((access, refresh))
        })
    }};

    let (access, refresh) = pair?;
    cache.cache_entity(&access).await;
    cache.cache_entity(&refresh).await;
    Ok(TokenPair {
        access,
        refresh,
    })
}

/// Fetches an access token by jti. Cache-through; `alive_only` is enforced by
/// the loader only -- a cached hit is trusted as-is.
pub async fn get_access(jti: Uuid, alive_only: bool, cache: &Cache, conn: &DbConn) -> Option<AccessToken> {
    let lookup = jti.to_string();
    cache
        .with_cache(&lookup, || async move {
            let token = AccessToken::find_by_jti(jti, conn).await?;
            if alive_only && !token.is_alive() {
                None
            } else {
                Some(token)
            }
        })
        .await
}

/// Get(refresh).
pub async fn get_refresh(jti: Uuid, alive_only: bool, cache: &Cache, conn: &DbConn) -> Option<RefreshToken> {
    let lookup = jti.to_string();
    cache
        .with_cache(&lookup, || async move {
            let token = RefreshToken::find_by_jti(jti, conn).await?;
            if alive_only && !token.is_alive() {
                None
            } else {
                Some(token)
            }
        })
        .await
}

/// Refresh. Atomic rotation: revoking the old pair and inserting the new one
/// share a single transaction, so a failure anywhere in the rotation rolls
/// back the revoke too -- the old pair stays usable rather than being burned
/// for nothing.
pub async fn refresh(
    refresh_jti: Uuid,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    cache: &Cache,
    conn: &DbConn,
) -> Result<TokenPair, Error> {
    let old_refresh = match get_refresh(refresh_jti, true, cache, conn).await {
        Some(t) => t,
        None => err_bad_request!("Not a valid refresh token"),
    };

    let user_id = old_refresh.user_id;
    let realm_str = old_refresh.realm.clone();
    let business_code = old_refresh.business_code.clone();
    let old_access_jti = old_refresh.access_token_jti;
    let ip_address = ip_address.map(str::to_string);
    let user_agent = user_agent.map(str::to_string);
    let access_ttl = Duration::seconds(CONFIG.access_token_ttl_secs());
    let refresh_ttl = Duration::seconds(CONFIG.refresh_token_ttl_secs());

    let rotated: Result<Option<(AccessToken, RefreshToken)>, Error> = db_run! {conn: {
        conn.transaction::<Option<(AccessToken, RefreshToken)>, Error, _>(|conn| {
            let won = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::jti.eq(refresh_jti))
                    .filter(refresh_tokens::revoked.eq(false)),
            )
            .set(refresh_tokens::revoked.eq(true))
            .execute(conn)
            .map_res("Error revoking refresh token")?;
            if won != 1 {
                return Ok(None);
            }

            if let Some(access_jti) = old_access_jti {
                diesel::update(
                    access_tokens::table
                        .filter(access_tokens::jti.eq(access_jti))
                        .filter(access_tokens::revoked.eq(false)),
                )
                .set(access_tokens::revoked.eq(true))
                .execute(conn)
                .map_res("Error revoking access token")?;
            }

            let now = Utc::now().naive_utc();
            let new_refresh_jti = Uuid::new_v4();
            let new_access_jti = Uuid::new_v4();

            let refresh = diesel::insert_into(refresh_tokens::table)
                .values(&NewRefreshToken {
                    jti: new_refresh_jti,
                    user_id,
                    realm: &realm_str,
                    business_code: business_code.as_deref(),
                    issued_at: now,
                    expires_at: now + refresh_ttl,
                })
                .get_result::<RefreshToken>(conn)
                .map_res("Error creating refresh token")?;

            let access = diesel::insert_into(access_tokens::table)
                .values(&NewAccessToken {
                    jti: new_access_jti,
                    user_id,
                    realm: &realm_str,
                    business_code: business_code.as_deref(),
                    ip_address: ip_address.as_deref(),
                    user_agent: user_agent.as_deref(),
                    issued_at: now,
                    expires_at: now + access_ttl,
                    refresh_token_jti: Some(new_refresh_jti),
                })
                .get_result::<AccessToken>(conn)
                .map_res("Error creating access token")?;

            let refresh = diesel::update(refresh_tokens::table.filter(refresh_tokens::jti.eq(new_refresh_jti)))
                .set(refresh_tokens::access_token_jti.eq(new_access_jti))
                .get_result::<RefreshToken>(conn)
                .map_res("Error linking refresh token")?;

            Ok(Some((access, refresh)))
        })
    }};

    let (access, refresh) = match rotated? {
        Some(pair) => pair,
        None => err_bad_request!("Not a valid refresh token"),
    };

    if let Some(access_jti) = old_access_jti {
        if let Some(old_access) = AccessToken::find_by_jti(access_jti, conn).await {
            cache.invalidate(&old_access).await;
        }
    }
    cache.invalidate(&old_refresh).await;
    cache.cache_entity(&access).await;
    cache.cache_entity(&refresh).await;

    Ok(TokenPair { access, refresh })
}

/// Revoke-access. Idempotent: a second call on an already-revoked
/// access token is a no-op.
pub async fn revoke_access(access: &AccessToken, cache: &Cache, conn: &DbConn) -> Result<(), Error> {
    AccessToken::revoke_if_alive(access.jti, conn).await?;
    if let Some(refresh_jti) = access.refresh_token_jti {
        RefreshToken::revoke_if_alive(refresh_jti, conn).await?;
        if let Some(refresh) = RefreshToken::find_by_jti(refresh_jti, conn).await {
            cache.invalidate(&refresh).await;
        }
    }
    cache.invalidate(access).await;
    Ok(())
}

/// User-revokes-by-jti. Only succeeds if the access row belongs to
/// `user_id`; returns whether a row was actually changed.
pub async fn user_revokes_by_jti(user_id: i64, jti: Uuid, cache: &Cache, conn: &DbConn) -> Result<bool, Error> {
    let access = match AccessToken::find_by_jti(jti, conn).await {
        Some(a) if a.user_id == user_id => a,
        _ => return Ok(false),
    };
    revoke_access(&access, cache, conn).await?;
    Ok(true)
}

/// List. For realm=mobile, `business_code` is required by the caller
/// (enforced upstream by the realm guard); this just mirrors the filter.
pub async fn list(
    user_id: i64,
    realm: Realm,
    business_code: Option<&str>,
    limit: i64,
    offset: i64,
    conn: &DbConn,
) -> Vec<AccessToken> {
    AccessToken::list(user_id, realm, business_code, limit, offset, conn).await
}

/// Count. Mirrors List's filter.
pub async fn count(user_id: i64, realm: Realm, business_code: Option<&str>, conn: &DbConn) -> i64 {
    AccessToken::count(user_id, realm, business_code, conn).await
}
