//
// OTP engine: generation, cooldown, rate-limiting, revocation,
// single-use enforcement. Rate limits are derived from the store (not the
// cache) and the whole send-otp algorithm runs inside one transaction.
//
use chrono::{Duration, Utc};
use diesel::prelude::*;

use crate::{
    cache::Cache,
    crypto,
    db::{
        models::{otp::NewOtp, Business, Otp},
        schema::otps,
        DbConn,
    },
    error::{Error, MapResult},
    realm::Realm,
    sms, CONFIG,
};

/// Sends a fresh OTP, enforcing cooldown and rate-limit windows first.
/// Fails `SmsCooldown` on cooldown/window trip, `NotFound` if
/// `business_code` is set but references nothing.
pub async fn send_otp(
    phone: &str,
    realm: Realm,
    business_code: Option<&str>,
    cache: &Cache,
    conn: &DbConn,
) -> Result<Otp, Error> {
    if let Some(code) = business_code {
        if Business::find_by_code_cached(code, cache, conn).await.is_none() {
            err_not_found!("Business does not exist");
        }
    }

    let phone = phone.to_string();
    let realm_str = realm.as_str().to_string();
    let business_code = business_code.map(str::to_string);
    let code_length = CONFIG.otp_code_length();
    let code_lifetime = Duration::seconds(CONFIG.otp_code_lifetime_secs());
    let cooldown = Duration::seconds(CONFIG.otp_sms_cooldown_secs());
    let window = Duration::seconds(CONFIG.otp_sms_limit_window_secs());
    let sms_limit = CONFIG.otp_sms_limit();
    let revoke_old = CONFIG.otp_revoke_old();

    let otp: Result<Otp, Error> = db_run! {conn: {
        conn.transaction::<Otp, Error, _>(|conn| {
            let now = Utc::now().naive_utc();

            let mut cooldown_query = otps::table
                .filter(otps::phone.eq(&phone))
                .filter(otps::sent_at.ge(now - cooldown))
                .into_boxed();
            cooldown_query = match business_code {
                Some(ref code) => cooldown_query.filter(otps::business_code.eq(code)),
                None => cooldown_query.filter(otps::business_code.is_null()),
            };
            let cooldown_count: i64 = cooldown_query.count().get_result(conn)?;
            if cooldown_count >= 1 {
                err_sms_cooldown!("Please wait before requesting another code");
            }

            let mut window_query = otps::table
                .filter(otps::phone.eq(&phone))
                .filter(otps::sent_at.ge(now - window))
                .into_boxed();
            window_query = match business_code {
                Some(ref code) => window_query.filter(otps::business_code.eq(code)),
                None => window_query.filter(otps::business_code.is_null()),
            };
            let window_count: i64 = window_query.count().get_result(conn)?;
            if window_count >= sms_limit {
                err_sms_cooldown!("Too many codes requested, please try again later");
            }

            if revoke_old {
                let mut revoke_query = otps::table
                    .filter(otps::phone.eq(&phone))
                    .filter(otps::revoked.eq(false))
                    .filter(otps::used.eq(false))
                    .into_boxed();
                revoke_query = match business_code {
                    Some(ref code) => revoke_query.filter(otps::business_code.eq(code)),
                    None => revoke_query.filter(otps::business_code.is_null()),
                };
                diesel::update(revoke_query).set(otps::revoked.eq(true)).execute(conn)?;
            }

            let code = crypto::generate_token(code_length)?;
            let otp = diesel::insert_into(otps::table)
                .values(&NewOtp {
                    phone: &phone,
                    business_code: business_code.as_deref(),
                    realm: &realm_str,
                    code: &code,
                    sent_at: now,
                    expires_at: now + code_lifetime,
                })
                .get_result::<Otp>(conn)
                .map_res("Error creating OTP")?;

            Ok(otp)
        })
    }};

    let otp = otp?;
    sms::dispatch_otp_sms(&otp.phone, &otp.code);
    Ok(otp)
}

/// Looks up the currently live (unexpired, unused, unrevoked) OTP for a phone.
pub async fn get_live_otp(phone: &str, business_code: Option<&str>, conn: &DbConn) -> Option<Otp> {
    Otp::find_live(phone, business_code, conn).await
}

/// Marks an OTP as used. Idempotent.
pub async fn mark_used(otp_id: i64, conn: &DbConn) {
    Otp::mark_used(otp_id, conn).await;
}
