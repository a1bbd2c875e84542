pub mod errors;
pub mod events;
pub mod ids;
pub mod otp;
pub mod platform;
pub mod security;
