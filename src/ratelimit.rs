//
// Per-IP rate limiting for the authentication surface (password login, OTP
// start/confirm, refresh). This is defense-in-depth on top of the OTP
// engine's own store-backed cooldown/window; it protects routes that
// have no such built-in limiter, e.g. repeated wrong-password attempts.
//
use std::{net::IpAddr, num::NonZeroU32, sync::LazyLock, time::Duration};

use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};

use crate::{error::Error, CONFIG};

type Limiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

static LIMITER_AUTH: LazyLock<Limiter> = LazyLock::new(|| {
    let seconds = Duration::from_secs(CONFIG.auth_ratelimit_seconds());
    let burst = NonZeroU32::new(CONFIG.auth_ratelimit_max_burst()).expect("non-zero auth ratelimit burst");
    RateLimiter::keyed(Quota::with_period(seconds).expect("non-zero auth ratelimit seconds").allow_burst(burst))
});

/// Checked on `/auth` and `/tokens/refresh` before any store access.
pub fn check_limit_auth(ip: &IpAddr) -> Result<(), Error> {
    match LIMITER_AUTH.check_key(ip) {
        Ok(_) => Ok(()),
        Err(_) => err_bad_request!("Too many requests, please try again later"),
    }
}
