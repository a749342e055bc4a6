use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::dto::{LoginRequest, SignupRequest};

const MAX_FIELD_LEN: usize = 255;

/// Every violation found in a request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    fn into_result<T>(self, ok: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(ok())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for m in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {m}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Signup input that passed validation. Email is normalized.
#[derive(Debug, Clone)]
pub struct ValidSignup {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ValidLogin {
    pub email: String,
    pub password: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Present and non-blank after trimming.
fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Present and non-empty, without trimming. Used for secrets.
fn present_raw(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

pub fn validate_signup(req: &SignupRequest) -> Result<ValidSignup, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let name = present(&req.name);
    match name {
        None => errors.add("name", "Enter full name"),
        Some(n) if n.chars().count() > MAX_FIELD_LEN => {
            errors.add("name", "Name may not be longer than 255 characters")
        }
        Some(_) => {}
    }

    let email = present(&req.email).map(normalize_email);
    match email.as_deref() {
        None => errors.add("email", "Enter an e-mail address"),
        Some(e) => {
            if !is_valid_email(e) {
                errors.add("email", "E-mail address is not valid");
            }
            if e.chars().count() > MAX_FIELD_LEN {
                errors.add("email", "E-mail address may not be longer than 255 characters");
            }
        }
    }

    let password = present_raw(&req.password);
    if password.is_none() {
        errors.add("password", "Password is required");
    }

    match (password, present_raw(&req.password_confirmation)) {
        (_, None) => errors.add("password_confirmation", "Password confirmation is required"),
        (Some(p), Some(c)) if p != c => errors.add(
            "password_confirmation",
            "The password and password confirmation must match",
        ),
        (None, Some(_)) => errors.add(
            "password_confirmation",
            "The password and password confirmation must match",
        ),
        _ => {}
    }

    errors.into_result(|| ValidSignup {
        name: name.unwrap_or_default().to_string(),
        email: email.unwrap_or_default(),
        password: password.unwrap_or_default().to_string(),
    })
}

pub fn validate_login(req: &LoginRequest) -> Result<ValidLogin, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let email = present(&req.email).map(normalize_email);
    if email.is_none() {
        errors.add("email", "Enter an e-mail address");
    }
    let password = present_raw(&req.password);
    if password.is_none() {
        errors.add("password", "Password is required");
    }

    errors.into_result(|| ValidLogin {
        email: email.unwrap_or_default(),
        password: password.unwrap_or_default().to_string(),
    })
}
