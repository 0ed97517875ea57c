use rand::rngs::OsRng;
use rand::RngCore;

/// Opaque refresh-token material: 32 bytes from the OS RNG, hex encoded.
///
/// Carries no claims; everything known about the token lives in the store.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
