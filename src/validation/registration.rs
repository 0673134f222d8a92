use crate::core::error::ValidationError;
use crate::models::Sid;

pub const MAX_PIN_LEN: usize = 12;

/// Check a registration request and return the normalized display name
pub fn validate_registration(sid: Sid, name: &str, min_sid: Sid) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if sid < min_sid {
        return Err(ValidationError::SidOutOfRange { sid, min: min_sid });
    }

    Ok(title_case(name))
}

/// Uppercase the first letter of every word, lowercase the rest.
/// Any non-alphabetic character starts a new word, so "o'neil" becomes "O'Neil".
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut word_start = true;

    for ch in input.chars() {
        if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = true;
        }
    }

    out
}

pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.is_empty() {
        return Err(ValidationError::EmptyPin);
    }

    if pin.len() > MAX_PIN_LEN {
        return Err(ValidationError::PinTooLong { max: MAX_PIN_LEN });
    }

    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::PinNotNumeric);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("ada lovelace"), "Ada Lovelace");
        assert_eq!(title_case("GRACE HOPPER"), "Grace Hopper");
        assert_eq!(title_case("mary-jane o'neil"), "Mary-Jane O'Neil");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_validate_registration() {
        assert_eq!(
            validate_registration(20123456, "  ada lovelace ", 20_000_000),
            Ok("Ada Lovelace".to_string())
        );
        assert_eq!(
            validate_registration(20123456, "   ", 20_000_000),
            Err(ValidationError::EmptyName)
        );
        assert_eq!(
            validate_registration(1234, "Ada", 20_000_000),
            Err(ValidationError::SidOutOfRange { sid: 1234, min: 20_000_000 })
        );
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("2468").is_ok());
        assert_eq!(validate_pin(""), Err(ValidationError::EmptyPin));
        assert_eq!(validate_pin("12a4"), Err(ValidationError::PinNotNumeric));
        assert_eq!(
            validate_pin("1234567890123"),
            Err(ValidationError::PinTooLong { max: MAX_PIN_LEN })
        );
    }
}
