//! Input validation for API requests.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating UUIDs
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    ).unwrap();

    /// Loose email shape check; the mailbox is never verified here
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Phone numbers: optional +, 7-15 digits
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9]{7,15}$"
    ).unwrap();
}

pub fn validate_uuid(id: &str, field: &str) -> Result<(), String> {
    if UUID_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(format!("{field} must be a valid UUID"))
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    if PHONE_REGEX.is_match(phone) {
        Ok(())
    } else {
        Err("Invalid phone number".to_string())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }
    if trimmed.len() > 100 {
        return Err("Name must be 100 characters or less".to_string());
    }
    Ok(())
}

pub fn validate_latitude(latitude: f64) -> Result<(), String> {
    if latitude.is_finite() && (-90.0..=90.0).contains(&latitude) {
        Ok(())
    } else {
        Err(format!("Invalid latitude: {latitude}"))
    }
}

pub fn validate_longitude(longitude: f64) -> Result<(), String> {
    if longitude.is_finite() && (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(format!("Invalid longitude: {longitude}"))
    }
}

pub fn validate_positive_amount(amount: f64, field: &str) -> Result<(), String> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be a positive amount"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_validation() {
        assert!(validate_uuid("a9b7ba70-783b-4b5e-9b6f-6a9c9f087658", "id").is_ok());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
        assert!(validate_uuid("", "id").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("rider@example.com").is_ok());
        assert!(validate_email("bad@").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_phone_validation() {
        assert!(validate_phone("+4915123456789").is_ok());
        assert!(validate_phone("015123456").is_ok());
        assert!(validate_phone("123").is_err());
        assert!(validate_phone("call me").is_err());
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(validate_latitude(52.52).is_ok());
        assert!(validate_latitude(-91.0).is_err());
        assert!(validate_latitude(f64::NAN).is_err());
        assert!(validate_longitude(180.0).is_ok());
        assert!(validate_longitude(181.0).is_err());
    }

    #[test]
    fn test_amount_validation() {
        assert!(validate_positive_amount(12.5, "fare").is_ok());
        assert!(validate_positive_amount(0.0, "fare").is_err());
        assert!(validate_positive_amount(f64::INFINITY, "fare").is_err());
    }
}
