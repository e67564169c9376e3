//
// Auth flow coordinator: orchestrates the OTP-path (mobile) and
// password-path (web) authentication flows end-to-end, on top of the OTP
// engine, token engine, and the User/Business/Client models.
//
use crate::{
    cache::Cache,
    crypto,
    db::{
        models::{Client, User},
        DbConn,
    },
    error::Error,
    otp_engine,
    realm::Realm,
    token_engine::{self, TokenPair},
};

/// Mobile OTP start. No tokens issued; just dispatches a code.
pub async fn mobile_otp_start(phone: &str, business_code: &str, cache: &Cache, conn: &DbConn) -> Result<(), Error> {
    otp_engine::send_otp(phone, Realm::Mobile, Some(business_code), cache, conn).await?;
    Ok(())
}

/// Mobile OTP confirm: validates the live OTP, gets-or-creates the
/// `User`/`Client` pair, and issues a fresh token pair.
pub async fn mobile_otp_confirm(
    phone: &str,
    otp_code: &str,
    business_code: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    cache: &Cache,
    conn: &DbConn,
) -> Result<(Client, TokenPair), Error> {
    let otp = match otp_engine::get_live_otp(phone, Some(business_code), conn).await {
        Some(otp) => otp,
        None => err_bad_request!("Wrong or expired otp code"),
    };
    if !crypto::ct_eq(&otp.code, otp_code) {
        err_bad_request!("Wrong or expired otp code");
    }
    otp_engine::mark_used(otp.id, conn).await;

    let user = get_or_create_user(phone, cache, conn).await?;
    let client = get_or_create_client(user.id, business_code, phone, cache, conn).await?;

    let tokens = token_engine::issue(user.id, Realm::Mobile, Some(business_code), ip_address, user_agent, cache, conn).await?;

    Ok((client, tokens))
}

/// Web password login.
pub async fn web_password_login(
    phone: &str,
    password: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    cache: &Cache,
    conn: &DbConn,
) -> Result<(User, crate::db::models::Business, TokenPair), Error> {
    let user = match User::find_by_phone_cached(phone, cache, conn).await {
        Some(user) => user,
        None => err_bad_request!("User does not exist"),
    };

    let business = match crate::db::models::Business::find_by_owner(user.id, conn).await {
        Some(business) => business,
        None => err_bad_request!("User has no businesses"),
    };

    if !user.check_password(password)? {
        err_bad_request!("Wrong password");
    }

    let tokens = token_engine::issue(user.id, Realm::Web, None, ip_address, user_agent, cache, conn).await?;

    Ok((user, business, tokens))
}

/// Creates the user on first successful OTP confirmation; otherwise returns
/// the existing one (cache-through by phone).
async fn get_or_create_user(phone: &str, cache: &Cache, conn: &DbConn) -> Result<User, Error> {
    if let Some(user) = User::find_by_phone_cached(phone, cache, conn).await {
        return Ok(user);
    }
    let user = User::create(phone, conn).await?;
    cache.cache_entity(&user).await;
    Ok(user)
}

/// Creates the `(user, business)` client row the first time this pair
/// authenticates in the mobile realm. There is no display-name input
/// at this point in the flow, so the phone number seeds `first_name` until
/// the client updates their profile.
async fn get_or_create_client(user_id: i64, business_code: &str, phone: &str, cache: &Cache, conn: &DbConn) -> Result<Client, Error> {
    if let Some(client) = Client::find_cached(user_id, business_code, cache, conn).await {
        return Ok(client);
    }
    let client = Client::create(user_id, business_code, phone, conn).await?;
    cache.cache_entity(&client).await;
    Ok(client)
}
