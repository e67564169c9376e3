use crate::error::Error;

//
// Random values
//

pub fn get_random_64() -> Vec<u8> {
    get_random(vec![0u8; 64])
}

pub fn get_random(mut array: Vec<u8>) -> Vec<u8> {
    use ring::rand::{SecureRandom, SystemRandom};

    SystemRandom::new().fill(&mut array).expect("Error generating random values");

    array
}

/// Cryptographically random, zero-padded decimal string of `token_size` digits.
/// Used for OTP codes, business codes, and client QR/reference codes.
pub fn generate_token(token_size: u32) -> Result<String, Error> {
    if token_size > 19 {
        err_internal!("Generating token failed")
    }

    // 8 bytes to create an u64 for up to 19 token digits
    let bytes = get_random(vec![0; 8]);
    let mut bytes_array = [0u8; 8];
    bytes_array.copy_from_slice(&bytes);

    let number = u64::from_be_bytes(bytes_array) % 10u64.pow(token_size);
    let token = format!("{number:0size$}", size = token_size as usize);
    Ok(token)
}

const ALPHA: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Uppercase-ASCII random string of `len` characters. Used for business codes.
pub fn generate_alpha_token(len: usize) -> String {
    let bytes = get_random(vec![0u8; len]);
    bytes.into_iter().map(|b| ALPHA[(b as usize) % ALPHA.len()] as char).collect()
}

//
// Constant time compare
//
pub fn ct_eq<T: AsRef<[u8]>, U: AsRef<[u8]>>(a: T, b: U) -> bool {
    use ring::constant_time::verify_slices_are_equal;

    verify_slices_are_equal(a.as_ref(), b.as_ref()).is_ok()
}
