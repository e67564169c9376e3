#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate diesel;

#[macro_use]
extern crate diesel_migrations;

#[macro_use]
extern crate serde_json;

mod api;
mod auth;
mod auth_flow;
mod cache;
mod config;
mod crypto;
mod db;
mod error;
mod otp_engine;
mod ratelimit;
mod realm;
mod sms;
mod token_engine;
mod util;

use cache::Cache;
use config::CONFIG;
use db::DbPool;

/// Structured logging via `fern`, filtered by `LOG_LEVEL`.
/// Rocket's own request logging is kept at `warn` so it doesn't duplicate
/// `util::DebugRequestLogger`'s per-request line at `debug`.
fn init_logging() {
    let level = util::get_env::<String>("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    let level = level.parse().unwrap_or(log::LevelFilter::Info);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .level_for("rocket", log::LevelFilter::Warn)
        .chain(std::io::stdout());

    if util::get_env_bool("USE_SYSLOG").unwrap_or(false) {
        dispatch = chain_syslog(dispatch);
    }

    if let Err(e) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {e}");
    }
}

#[cfg(unix)]
fn chain_syslog(dispatch: fern::Dispatch) -> fern::Dispatch {
    let syslog_fmt = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_USER,
        hostname: None,
        process: "loyalty-auth-core".into(),
        pid: 0,
    };

    match syslog::unix(syslog_fmt) {
        Ok(sl) => dispatch.chain(sl),
        Err(e) => {
            eprintln!("Unable to connect to syslog: {e:?}");
            dispatch
        }
    }
}

#[cfg(not(unix))]
fn chain_syslog(dispatch: fern::Dispatch) -> fern::Dispatch {
    eprintln!("Cannot configure syslog on non-unix systems.");
    dispatch
}

#[rocket::main]
async fn main() {
    init_logging();

    // `Config::load` already exits the process on a missing/short token
    // secret; forcing the lazy static here makes that the very first thing
    // that can fail, before any connection is attempted.
    let _ = &*CONFIG;

    let db_pool = match DbPool::from_config() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database pool: {e:?}");
            std::process::exit(1);
        }
    };

    let cache = Cache::from_config().await;

    let result = rocket::build()
        .mount("/", api::routes())
        .manage(db_pool)
        .manage(cache)
        .attach(util::AppHeaders())
        .attach(util::Cors())
        .attach(util::DebugRequestLogger())
        .launch()
        .await;

    if let Err(e) = result {
        error!("Rocket failed to launch: {e}");
        std::process::exit(1);
    }
}
