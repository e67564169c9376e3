use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{Cache, Cacheable},
    crypto,
    db::{schema::clients, DbConn},
    error::{Error, MapResult},
};

const QR_CODE_LEN: u32 = 12;

/// Joins a `User` to a `Business`. Canonical cache key is the
/// composite `clients:{user_id}:{business_code}`.
#[derive(Debug, Clone, Queryable, Identifiable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = clients)]
#[diesel(primary_key(user_id, business_code))]
pub struct Client {
    pub user_id: i64,
    pub business_code: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub bonuses: f64,
    pub image: Option<String>,
    pub is_staff: bool,
    pub qr_code: String,
    pub deleted: bool,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = clients)]
struct NewClient<'a> {
    user_id: i64,
    business_code: &'a str,
    first_name: &'a str,
    qr_code: &'a str,
}

impl Cacheable for Client {
    const TABLE: &'static str = "clients";

    fn cache_primary_value(&self) -> String {
        Self::composite_key(self.user_id, &self.business_code)
    }
}

impl Client {
    pub fn composite_key(user_id: i64, business_code: &str) -> String {
        format!("{user_id}:{business_code}")
    }

    pub async fn find(user_id: i64, business_code: &str, conn: &DbConn) -> Option<Self> {
        let business_code = business_code.to_string();
        db_run! {conn: {
            clients::table
                .filter(clients::user_id.eq(user_id))
                .filter(clients::business_code.eq(business_code))
                .first::<Client>(conn)
                .ok()
        }}
    }

    /// Cache-through lookup by the composite `(user_id, business_code)` key.
    pub async fn find_cached(user_id: i64, business_code: &str, cache: &Cache, conn: &DbConn) -> Option<Self> {
        let lookup = Self::composite_key(user_id, business_code);
        cache.with_cache(&lookup, || async { Self::find(user_id, business_code, conn).await }).await
    }

    /// Creates a fresh, non-staff client with a random numeric QR code and
    /// zero bonuses -- the state every (user, business) pair starts in the
    /// first time it authenticates in the mobile realm.
    pub async fn create(user_id: i64, business_code: &str, first_name: &str, conn: &DbConn) -> Result<Self, Error> {
        let business_code = business_code.to_string();
        let first_name = first_name.to_string();
        let qr_code = crypto::generate_token(QR_CODE_LEN)?;

        db_run! {conn: {
            diesel::insert_into(clients::table)
                .values(&NewClient { user_id, business_code: &business_code, first_name: &first_name, qr_code: &qr_code })
                .get_result(conn)
                .map_res("Error creating client")
        }}
    }

    pub async fn soft_delete(mut self, conn: &DbConn) -> Result<(), Error> {
        self.deleted = true;
        self.deleted_at = Some(Utc::now().naive_utc());
        db_run! {conn: {
            diesel::update(clients::table.find((self.user_id, self.business_code.clone())))
                .set((clients::deleted.eq(true), clients::deleted_at.eq(self.deleted_at)))
                .execute(conn)
                .map_res("Error deleting client")
                .map(|_| ())
        }}
    }
}
