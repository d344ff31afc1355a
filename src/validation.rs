//! Input-boundary checks. Every failure is a [`Notice`] shown to the user;
//! none of them leave the store half-changed because they run before it.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

/// A user-facing validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    #[error("Please fill all fields (missing: {})", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Please login first")]
    LoginRequired,

    #[error("Only {0} accounts can do that")]
    Forbidden(&'static str),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Cannot book appointment for past dates")]
    PastDate,

    #[error("Age must be between {min} and {max}")]
    AgeOutOfRange { min: u8, max: u8 },

    #[error("Unknown hospital '{0}'")]
    UnknownHospital(String),

    #[error("Unknown specialization '{0}'")]
    UnknownSpecialty(String),

    #[error("Unknown blood type '{0}' (use A+, A-, B+, B-, O+, O-, AB+, AB-)")]
    UnknownBloodType(String),

    #[error("Unknown delivery time '{0}' (use morning, afternoon, evening, anytime)")]
    UnknownDeliveryWindow(String),

    #[error("Unknown role '{0}' (use Patient, Doctor, Donor, Admin)")]
    UnknownRole(String),

    #[error("No medicine order with id '{0}'")]
    UnknownOrder(String),
}

/// Fail with every label whose value is blank
pub fn require_fields(fields: &[(&str, &str)]) -> Result<(), Notice> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(label, _)| label.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Notice::MissingFields(missing))
    }
}

pub fn validate_email(email: &str) -> Result<(), Notice> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(Notice::InvalidEmail)
    }
}

/// Length is checked before confirmation, matching the signup form
pub fn validate_new_password(password: &str, confirm: &str, min_len: usize) -> Result<(), Notice> {
    if password.chars().count() < min_len {
        return Err(Notice::PasswordTooShort { min: min_len });
    }
    if password != confirm {
        return Err(Notice::PasswordMismatch);
    }
    Ok(())
}

pub fn parse_date(s: &str) -> Result<NaiveDate, Notice> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| Notice::InvalidDate(s.to_string()))
}

/// Today is bookable; yesterday is not
pub fn validate_not_past(date: NaiveDate, today: NaiveDate) -> Result<(), Notice> {
    if date < today {
        Err(Notice::PastDate)
    } else {
        Ok(())
    }
}

/// Parse a donor age and check it against the inclusive bounds
pub fn validate_donor_age(age: &str, min: u8, max: u8) -> Result<u8, Notice> {
    let out_of_range = Notice::AgeOutOfRange { min, max };
    let value: i64 = age.trim().parse().map_err(|_| out_of_range.clone())?;
    if value < i64::from(min) || value > i64::from(max) {
        return Err(out_of_range);
    }
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_fields_lists_blanks() {
        assert!(require_fields(&[("name", "Ravi"), ("contact", "99")]).is_ok());
        let err = require_fields(&[("name", " "), ("contact", "99"), ("date", "")]).unwrap_err();
        assert_eq!(
            err,
            Notice::MissingFields(vec!["name".to_string(), "date".to_string()])
        );
        assert!(err.to_string().contains("missing: name, date"));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ravi@example.com").is_ok());
        assert_eq!(validate_email("ravi@example"), Err(Notice::InvalidEmail));
        assert_eq!(validate_email("@."), Err(Notice::InvalidEmail));
        assert_eq!(validate_email("a b@c.d"), Err(Notice::InvalidEmail));
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("secret", "secret", 6).is_ok());
        assert_eq!(
            validate_new_password("short", "short", 6),
            Err(Notice::PasswordTooShort { min: 6 })
        );
        assert_eq!(
            validate_new_password("secret1", "secret2", 6),
            Err(Notice::PasswordMismatch)
        );
    }

    #[test]
    fn test_dates() {
        let today = NaiveDate::from_ymd_opt(2030, 5, 10).unwrap();
        assert!(validate_not_past(today, today).is_ok());
        assert!(validate_not_past(today.succ_opt().unwrap(), today).is_ok());
        assert_eq!(
            validate_not_past(today.pred_opt().unwrap(), today),
            Err(Notice::PastDate)
        );
        assert_eq!(parse_date("2030-05-10").unwrap(), today);
        assert!(matches!(parse_date("10/05/2030"), Err(Notice::InvalidDate(_))));
    }

    #[test]
    fn test_donor_age_bounds_are_inclusive() {
        assert_eq!(validate_donor_age("18", 18, 65), Ok(18));
        assert_eq!(validate_donor_age("65", 18, 65), Ok(65));
        let out = Err(Notice::AgeOutOfRange { min: 18, max: 65 });
        assert_eq!(validate_donor_age("17", 18, 65), out);
        assert_eq!(validate_donor_age("66", 18, 65), out);
        assert_eq!(validate_donor_age("-3", 18, 65), out);
        assert_eq!(validate_donor_age("old", 18, 65), out);
    }
}
