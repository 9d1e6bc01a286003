use crate::core::error::AdminError;

/// Verify an admin API key in constant time
pub fn verify_api_key(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());

    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Gate for the admin surface. With no key configured every admin call is refused.
pub fn authorize_admin(configured: Option<&str>, provided: &str) -> Result<(), AdminError> {
    match configured {
        None => Err(AdminError::Disabled),
        Some(expected) if verify_api_key(provided, expected) => Ok(()),
        Some(_) => Err(AdminError::InvalidApiKey),
    }
}
