//! Field validation for each step of the registration form.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, member::MemberRecord};

/// Largest accepted profile photo.
pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   &'static str,
  pub message: &'static str,
}

impl FieldError {
  fn new(field: &'static str, message: &'static str) -> Self { Self { field, message } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
  Personal,
  Location,
  Membership,
}

/// Metadata of an uploaded photo; the bytes themselves go to file storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoUpload {
  pub content_type: String,
  pub size_bytes:   u64,
}

/// Validate the fields owned by `step`, reporting every failure at once.
pub fn validate_step(step: Step, record: &MemberRecord) -> Result<()> {
  let errors = match step {
    Step::Personal => personal(record),
    Step::Location => location(record),
    Step::Membership => membership(record),
  };
  if errors.is_empty() { Ok(()) } else { Err(Error::Validation(errors)) }
}

/// Validate every step; used right before payment.
pub fn validate_all(record: &MemberRecord) -> Result<()> {
  let mut errors = personal(record);
  errors.extend(location(record));
  errors.extend(membership(record));
  if errors.is_empty() { Ok(()) } else { Err(Error::Validation(errors)) }
}

pub fn validate_photo(photo: &PhotoUpload) -> Result<()> {
  let mut errors = Vec::new();
  if photo.size_bytes > MAX_PHOTO_BYTES {
    errors.push(FieldError::new("photo", "Please select a file smaller than 5MB"));
  }
  if !photo.content_type.starts_with("image/") {
    errors.push(FieldError::new("photo", "Please select an image file"));
  }
  if errors.is_empty() { Ok(()) } else { Err(Error::Validation(errors)) }
}

fn personal(record: &MemberRecord) -> Vec<FieldError> {
  let p = &record.profile;
  let mut errors = Vec::new();
  if p.name.trim().is_empty() {
    errors.push(FieldError::new("name", "Name is required"));
  }
  if p.dob.is_none() {
    errors.push(FieldError::new("dob", "Date of Birth is required"));
  }
  if !p.email.trim().is_empty() && !looks_like_email(p.email.trim()) {
    errors.push(FieldError::new("email", "Please enter a valid email address"));
  }
  if p.gender.is_none() {
    errors.push(FieldError::new("gender", "Gender is required"));
  }
  if p.blood_group.trim().is_empty() {
    errors.push(FieldError::new("blood_group", "Blood Group is required"));
  }
  let pan = p.pan.trim().to_uppercase();
  if pan.is_empty() {
    errors.push(FieldError::new("pan", "PAN number is required"));
  } else if !is_pan(&pan) {
    errors.push(FieldError::new("pan", "Invalid PAN format (e.g., ABCDE1234F)"));
  }
  errors
}

fn location(record: &MemberRecord) -> Vec<FieldError> {
  let p = &record.profile;
  let mut errors = Vec::new();
  if p.district.trim().is_empty() {
    errors.push(FieldError::new("district", "District is required"));
  }
  if p.subdistrict.trim().is_empty() {
    errors.push(FieldError::new("subdistrict", "Subdistrict is required"));
  }
  if p.village.trim().is_empty() {
    errors.push(FieldError::new("village", "Village is required"));
  }
  errors
}

fn membership(record: &MemberRecord) -> Vec<FieldError> {
  match &record.member_id {
    Some(id) if !id.as_str().trim().is_empty() => Vec::new(),
    _ => vec![FieldError::new("member_id", "Member ID is required")],
  }
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
fn looks_like_email(s: &str) -> bool {
  if s.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = s.split_once('@') else { return false };
  if local.is_empty() || domain.contains('@') {
    return false;
  }
  domain
    .char_indices()
    .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Five letters, four digits, one letter.
fn is_pan(s: &str) -> bool {
  let b = s.as_bytes();
  b.len() == 10
    && b[..5].iter().all(u8::is_ascii_uppercase)
    && b[5..9].iter().all(u8::is_ascii_digit)
    && b[9].is_ascii_uppercase()
}
