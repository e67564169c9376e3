mod business;
mod client;
pub(crate) mod otp;
mod token;
mod user;

pub use business::Business;
pub use client::Client;
pub use otp::Otp;
pub use token::{AccessToken, RefreshToken};
pub use user::User;
