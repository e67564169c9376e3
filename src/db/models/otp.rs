use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    db::{schema::otps, DbConn},
    realm::Realm,
};

/// A one-time code issued for a phone number. Not `Cacheable` -- rate-limit
/// and liveness queries always hit the store directly, so a cache flush
/// can never unlock abuse that the store would otherwise have blocked.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = otps)]
pub struct Otp {
    pub id: i64,
    pub phone: String,
    pub business_code: Option<String>,
    pub realm: String,
    pub code: String,
    pub sent_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub used: bool,
    pub revoked: bool,
}

#[derive(Insertable)]
#[diesel(table_name = otps)]
pub(crate) struct NewOtp<'a> {
    pub phone: &'a str,
    pub business_code: Option<&'a str>,
    pub realm: &'a str,
    pub code: &'a str,
    pub sent_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Otp {
    /// Read-only accessor for `phone`, used where callers think in terms of
    /// the delivery destination rather than the stored field name.
    pub fn destination(&self) -> &str {
        &self.phone
    }

    pub fn realm(&self) -> Realm {
        self.realm.parse().unwrap_or(Realm::Mobile)
    }

    pub fn is_live(&self) -> bool {
        !self.revoked && !self.used && self.expires_at > Utc::now().naive_utc()
    }

    pub async fn find_by_id(id: i64, conn: &DbConn) -> Option<Self> {
        db_run! {conn: {
            otps::table.filter(otps::id.eq(id)).first::<Otp>(conn).ok()
        }}
    }

    /// The single row satisfying the liveness predicate for `(phone,
    /// business_code)`, if any.
    pub async fn find_live(phone: &str, business_code: Option<&str>, conn: &DbConn) -> Option<Self> {
        let phone = phone.to_string();
        let business_code = business_code.map(str::to_string);
        let now = Utc::now().naive_utc();
        db_run! {conn: {
            let mut query = otps::table
                .filter(otps::phone.eq(phone))
                .filter(otps::revoked.eq(false))
                .filter(otps::used.eq(false))
                .filter(otps::expires_at.gt(now))
                .into_boxed();
            query = match business_code {
                Some(ref code) => query.filter(otps::business_code.eq(code)),
                None => query.filter(otps::business_code.is_null()),
            };
            query.order(otps::sent_at.desc()).first::<Otp>(conn).ok()
        }}
    }

    pub async fn mark_used(id: i64, conn: &DbConn) {
        db_run! {conn: {
            let _ = diesel::update(otps::table.filter(otps::id.eq(id)))
                .set(otps::used.eq(true))
                .execute(conn);
        }}
    }
}
