use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{Cache, Cacheable},
    crypto,
    db::{schema::businesses, DbConn},
    error::{Error, MapResult},
};

/// A business: `code` is both the public identity and the canonical cache
/// key; one business per `owner_id`.
#[derive(Debug, Clone, Queryable, Identifiable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = businesses)]
#[diesel(primary_key(code))]
pub struct Business {
    pub code: String,
    pub name: String,
    pub image: Option<String>,
    pub owner_id: i64,
}

#[derive(Insertable)]
#[diesel(table_name = businesses)]
struct NewBusiness<'a> {
    code: &'a str,
    name: &'a str,
    image: Option<&'a str>,
    owner_id: i64,
}

impl Cacheable for Business {
    const TABLE: &'static str = "businesses";

    fn cache_primary_value(&self) -> String {
        self.code.clone()
    }
}

const BUSINESS_CODE_LEN: usize = 16;

impl Business {
    pub async fn find_by_code(code: &str, conn: &DbConn) -> Option<Self> {
        let code = code.to_string();
        db_run! {conn: {
            businesses::table.filter(businesses::code.eq(code)).first::<Business>(conn).ok()
        }}
    }

    /// Cache-through lookup by `code`, used for the existence check against
    /// businesses before inserts that reference one.
    pub async fn find_by_code_cached(code: &str, cache: &Cache, conn: &DbConn) -> Option<Self> {
        cache.with_cache(code, || async { Self::find_by_code(code, conn).await }).await
    }

    pub async fn find_by_owner(owner_id: i64, conn: &DbConn) -> Option<Self> {
        db_run! {conn: {
            businesses::table.filter(businesses::owner_id.eq(owner_id)).first::<Business>(conn).ok()
        }}
    }

    /// Generates a fresh 16-letter code, retrying on the (astronomically
    /// unlikely) collision, and enforces the one-business-per-owner invariant.
    pub async fn create(owner_id: i64, name: &str, image: Option<&str>, conn: &DbConn) -> Result<Self, Error> {
        if Self::find_by_owner(owner_id, conn).await.is_some() {
            err_bad_request!("User already owns a business");
        }

        let name = name.to_string();
        let image = image.map(str::to_string);

        for _ in 0..5 {
            let code = crypto::generate_alpha_token(BUSINESS_CODE_LEN);
            let name = name.clone();
            let image = image.clone();
            let result: Result<Self, Error> = db_run! {conn: {
                diesel::insert_into(businesses::table)
                    .values(&NewBusiness { code: &code, name: &name, image: image.as_deref(), owner_id })
                    .get_result(conn)
                    .map_res("Error creating business")
            }};
            match result {
                Ok(business) => return Ok(business),
                Err(Error::Internal(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        err_internal!("Could not generate a unique business code")
    }
}
