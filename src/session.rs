//! Cookie-session keys.

pub const ACCESS_TOKEN: &str = "access_token";
pub const RETURN_URL: &str = "return_url";
