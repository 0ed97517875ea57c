pub mod jwt;
pub mod password;
pub mod refresh;

pub use jwt::{Claims, Expiry, ACCESS_ISSUER, REFRESH_ISSUER};
pub use password::{digest_password, generate_salt, hash_password, verify_password};
pub use refresh::generate_refresh_token;
