use validator::ValidationError;

pub const MIN_SEARCH_QUERY_LEN: usize = 2;
const MAX_USERNAME_LEN: usize = 32;
const MAX_MESSAGE_LEN: usize = 4000;

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("username_empty"));
    }
    if trimmed.len() > MAX_USERNAME_LEN {
        return Err(ValidationError::new("username_length"));
    }
    Ok(())
}

pub fn validate_password(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new("password_empty"));
    }
    Ok(())
}

pub fn validate_message_text(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_MESSAGE_LEN {
        return Err(ValidationError::new("message_text_length"));
    }
    Ok(())
}

/// Search runs on two characters or more; shorter queries are answered
/// with an empty result set instead of an error.
pub fn validate_search_query(value: &str) -> Result<(), ValidationError> {
    if value.trim().len() < MIN_SEARCH_QUERY_LEN {
        return Err(ValidationError::new("search_query_length"));
    }
    Ok(())
}

pub fn validate_avatar_url(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("avatar_url_empty"));
    }
    if trimmed.len() > 1024 {
        return Err(ValidationError::new("avatar_url_length"));
    }
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ValidationError::new("avatar_url_scheme"));
    }
    Ok(())
}
