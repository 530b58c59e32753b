use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::auth::dto::{LoginRequest, SignupRequest};

pub const MIN_PASSWORD_LEN: usize = 6;

/// One failed check on one request field.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub msg: &'static str,
    pub path: &'static str,
    pub location: &'static str,
}

impl FieldError {
    fn body(path: &'static str, msg: &'static str, value: Option<&str>) -> Self {
        Self {
            kind: "field",
            value: value.map(str::to_owned),
            msg,
            path,
            location: "body",
        }
    }
}

/// International form: `+`, a non-zero country digit, 8 to 15 digits in all.
/// National form: 10 to 15 digits. Single spaces or dashes may separate digits.
pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex =
            Regex::new(r"^(?:\+[1-9](?:[ -]?[0-9]){7,14}|[0-9](?:[ -]?[0-9]){9,14})$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub fn validate_signup(req: &SignupRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if is_blank(&req.username) {
        errors.push(FieldError::body("username", "Username is required", Some(req.username.as_str())));
    }
    // Submitted passwords are never echoed back.
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::body(
            "password",
            "Password is required and should be at least 6 characters long",
            None,
        ));
    }
    if !is_valid_phone(&req.phone) {
        errors.push(FieldError::body(
            "phone",
            "Phone is required and should be a valid phone number",
            Some(req.phone.as_str()),
        ));
    }
    if is_blank(&req.name) {
        errors.push(FieldError::body("name", "Name is required", Some(req.name.as_str())));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if is_blank(&req.username) {
        errors.push(FieldError::body("username", "Username is required", Some(req.username.as_str())));
    }
    if req.password.is_empty() {
        errors.push(FieldError::body("password", "Password is required", None));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
