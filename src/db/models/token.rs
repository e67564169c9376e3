use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    cache::Cacheable,
    db::{
        schema::{access_tokens, refresh_tokens},
        DbConn,
    },
    error::{Error, MapResult},
    realm::Realm,
};

/// An issued access token. The cyclic `refresh_token_jti` link is
/// back-patched after the paired `RefreshToken` insert, inside the same
/// transaction.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = access_tokens)]
#[diesel(primary_key(jti))]
pub struct AccessToken {
    pub jti: Uuid,
    pub user_id: i64,
    pub realm: String,
    pub business_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked: bool,
    pub refresh_token_jti: Option<Uuid>,
}

#[derive(Insertable)]
#[diesel(table_name = access_tokens)]
pub(crate) struct NewAccessToken<'a> {
    pub jti: Uuid,
    pub user_id: i64,
    pub realm: &'a str,
    pub business_code: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub refresh_token_jti: Option<Uuid>,
}

/// An issued refresh token.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = refresh_tokens)]
#[diesel(primary_key(jti))]
pub struct RefreshToken {
    pub jti: Uuid,
    pub user_id: i64,
    pub realm: String,
    pub business_code: Option<String>,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked: bool,
    pub access_token_jti: Option<Uuid>,
}

#[derive(Insertable)]
#[diesel(table_name = refresh_tokens)]
pub(crate) struct NewRefreshToken<'a> {
    pub jti: Uuid,
    pub user_id: i64,
    pub realm: &'a str,
    pub business_code: Option<&'a str>,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Cacheable for AccessToken {
    const TABLE: &'static str = "access_tokens";

    fn cache_primary_value(&self) -> String {
        self.jti.to_string()
    }
}

impl Cacheable for RefreshToken {
    const TABLE: &'static str = "refresh_tokens";

    fn cache_primary_value(&self) -> String {
        self.jti.to_string()
    }
}

impl AccessToken {
    pub fn is_alive(&self) -> bool {
        !self.revoked && self.expires_at > Utc::now().naive_utc()
    }

    pub fn realm(&self) -> Realm {
        self.realm.parse().unwrap_or(Realm::Web)
    }

    pub async fn find_by_jti(jti: Uuid, conn: &DbConn) -> Option<Self> {
        db_run! {conn: {
            access_tokens::table.filter(access_tokens::jti.eq(jti)).first::<AccessToken>(conn).ok()
        }}
    }

    /// Marks this row revoked iff it is currently not revoked; returns
    /// whether this call was the one that did it.
    pub async fn revoke_if_alive(jti: Uuid, conn: &DbConn) -> Result<bool, Error> {
        db_run! {conn: {
            diesel::update(access_tokens::table.filter(access_tokens::jti.eq(jti)).filter(access_tokens::revoked.eq(false)))
                .set(access_tokens::revoked.eq(true))
                .execute(conn)
                .map_res("Error revoking access token")
                .map(|rows| rows == 1)
        }}
    }

    pub async fn list(
        user_id: i64,
        realm: Realm,
        business_code: Option<&str>,
        limit: i64,
        offset: i64,
        conn: &DbConn,
    ) -> Vec<Self> {
        let realm = realm.as_str().to_string();
        let business_code = business_code.map(str::to_string);
        db_run! {conn: {
            let mut query = access_tokens::table
                .filter(access_tokens::user_id.eq(user_id))
                .filter(access_tokens::realm.eq(realm))
                .into_boxed();
            query = match business_code {
                Some(ref code) => query.filter(access_tokens::business_code.eq(code)),
                None => query.filter(access_tokens::business_code.is_null()),
            };
            query
                .order(access_tokens::issued_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<AccessToken>(conn)
                .unwrap_or_default()
        }}
    }

    pub async fn count(user_id: i64, realm: Realm, business_code: Option<&str>, conn: &DbConn) -> i64 {
        let realm = realm.as_str().to_string();
        let business_code = business_code.map(str::to_string);
        db_run! {conn: {
            let mut query = access_tokens::table
                .filter(access_tokens::user_id.eq(user_id))
                .filter(access_tokens::realm.eq(realm))
                .into_boxed();
            query = match business_code {
                Some(ref code) => query.filter(access_tokens::business_code.eq(code)),
                None => query.filter(access_tokens::business_code.is_null()),
            };
            query.count().get_result(conn).unwrap_or(0)
        }}
    }
}

impl RefreshToken {
    pub fn is_alive(&self) -> bool {
        !self.revoked && self.expires_at > Utc::now().naive_utc()
    }

    pub fn realm(&self) -> Realm {
        self.realm.parse().unwrap_or(Realm::Web)
    }

    pub async fn find_by_jti(jti: Uuid, conn: &DbConn) -> Option<Self> {
        db_run! {conn: {
            refresh_tokens::table.filter(refresh_tokens::jti.eq(jti)).first::<RefreshToken>(conn).ok()
        }}
    }

    pub async fn revoke_if_alive(jti: Uuid, conn: &DbConn) -> Result<bool, Error> {
        db_run! {conn: {
            diesel::update(refresh_tokens::table.filter(refresh_tokens::jti.eq(jti)).filter(refresh_tokens::revoked.eq(false)))
                .set(refresh_tokens::revoked.eq(true))
                .execute(conn)
                .map_res("Error revoking refresh token")
                .map(|rows| rows == 1)
        }}
    }
}
