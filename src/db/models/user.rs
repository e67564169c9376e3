use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{Cache, Cacheable},
    db::{schema::users, DbConn},
    error::{Error, MapResult},
};

/// A user account: identity is `id`, `phone` is a unique reference key,
/// password is only ever set for web-realm (business-owner) accounts.
#[derive(Debug, Clone, Queryable, Identifiable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_admin: bool,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    phone: &'a str,
    password_hash: Option<&'a str>,
    is_admin: bool,
}

impl Cacheable for User {
    const TABLE: &'static str = "users";
    const REFERENCE_ATTRS: &'static [&'static str] = &["phone"];

    fn cache_primary_value(&self) -> String {
        self.id.to_string()
    }

    fn cache_reference_values(&self) -> Vec<(&'static str, String)> {
        vec![("phone", self.phone.clone())]
    }
}

impl User {
    pub async fn find_by_id(id: i64, conn: &DbConn) -> Option<Self> {
        db_run! {conn: {
            users::table.filter(users::id.eq(id)).first::<User>(conn).ok()
        }}
    }

    pub async fn find_by_phone(phone: &str, conn: &DbConn) -> Option<Self> {
        let phone = phone.to_string();
        db_run! {conn: {
            users::table.filter(users::phone.eq(phone)).first::<User>(conn).ok()
        }}
    }

    /// Cache-through lookup by `phone` (a reference key): the canonical
    /// probe misses by construction, the `phone` reference key then hits.
    pub async fn find_by_phone_cached(phone: &str, cache: &Cache, conn: &DbConn) -> Option<Self> {
        cache.with_cache(phone, || async { Self::find_by_phone(phone, conn).await }).await
    }

    /// Cache-through lookup by `id` (the canonical key).
    pub async fn find_by_id_cached(id: i64, cache: &Cache, conn: &DbConn) -> Option<Self> {
        let lookup = id.to_string();
        cache.with_cache(&lookup, || async { Self::find_by_id(id, conn).await }).await
    }

    /// Inserts a brand new user with no password set (created via OTP
    /// confirmation). Admin-created users set a password separately.
    pub async fn create(phone: &str, conn: &DbConn) -> Result<Self, Error> {
        let phone = phone.to_string();
        db_run! {conn: {
            diesel::insert_into(users::table)
                .values(&NewUser { phone: &phone, password_hash: None, is_admin: false })
                .get_result(conn)
                .map_res("Error creating user")
        }}
    }

    /// Admin-created account (password-based, web realm). Checked against
    /// an existing phone first so the duplicate case surfaces as the
    /// distinct `UserExists` kind rather than a generic store error.
    pub async fn create_with_password(
        phone: &str,
        password_hash: &str,
        is_admin: bool,
        conn: &DbConn,
    ) -> Result<Self, Error> {
        if Self::find_by_phone(phone, conn).await.is_some() {
            err_user_exists!("A user with this phone number already exists");
        }

        let phone = phone.to_string();
        let password_hash = password_hash.to_string();
        db_run! {conn: {
            diesel::insert_into(users::table)
                .values(&NewUser { phone: &phone, password_hash: Some(&password_hash), is_admin })
                .get_result(conn)
                .map_res("Error creating user")
        }}
    }

    pub fn check_password(&self, password: &str) -> Result<bool, Error> {
        match &self.password_hash {
            Some(hash) => bcrypt::verify(password, hash).map_res("Error verifying password"),
            None => err_internal!("User has no password set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_bit_exact() {
        let u = User {
            id: 42,
            phone: "+15551234567".to_string(),
            password_hash: None,
            is_admin: false,
        };
        assert_eq!(u.canonical_key(), "users:42");
        assert_eq!(u.reference_keys(), vec!["ref:users:phone:+15551234567".to_string()]);
    }
}
