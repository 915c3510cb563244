//! Member records, the durable entity of the onboarding flow.
//!
//! A member document lives at a storage key ([`DocumentId`]) and carries an
//! identifier field ([`MemberId`]). For canonical records the two are equal;
//! legacy documents were keyed by ad-hoc ids (e.g. `member_42`) and are
//! relocated under their canonical id on the final save.

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result, member_id::CANONICAL_PREFIX};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Storage location key of a member document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DocumentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&MemberId> for DocumentId {
  fn from(id: &MemberId) -> Self { Self(id.as_str().to_owned()) }
}

/// The member identifier field, canonical (`SFA-…`) or legacy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Whether the identifier already carries the canonical prefix.
  pub fn is_canonical(&self) -> bool { self.0.starts_with(CANONICAL_PREFIX) }
}

impl fmt::Display for MemberId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Phone ───────────────────────────────────────────────────────────────────

/// A validated ten-digit mobile number, the natural lookup key of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
  /// Strip every non-digit from `input` and require `[6-9]` followed by nine
  /// more digits.
  pub fn parse(input: &str) -> Result<Self> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    let valid = digits.len() == 10
      && digits.starts_with(|c: char| ('6'..='9').contains(&c));
    if valid {
      Ok(Self(digits))
    } else {
      Err(Error::InvalidPhone(input.to_owned()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PhoneNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for PhoneNumber {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::parse(&value) }
}

impl From<PhoneNumber> for String {
  fn from(value: PhoneNumber) -> Self { value.0 }
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Ordinary members pay the registration fee; contributing members pay the
/// higher donation amount.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum MemberClass {
  #[default]
  #[serde(rename = "CORE")]
  Ordinary,
  #[serde(rename = "EXECUTIVE")]
  Contributing,
}

impl MemberClass {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Ordinary => "CORE",
      Self::Contributing => "EXECUTIVE",
    }
  }

  /// Decode from the string form, falling back to the legacy boolean flag
  /// when the string is absent or unrecognised.
  pub fn from_legacy(member_type: Option<&str>, is_executive: Option<bool>) -> Self {
    match member_type {
      Some("EXECUTIVE") => Self::Contributing,
      Some("CORE") => Self::Ordinary,
      _ if is_executive == Some(true) => Self::Contributing,
      _ => Self::Ordinary,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
  Male,
  Female,
  Other,
}

impl Gender {
  /// Map free-form input onto a gender. Empty input yields `None`.
  pub fn normalize(raw: &str) -> Option<Self> {
    let s = raw.trim().to_lowercase();
    match s.as_str() {
      "" => None,
      "m" | "male" | "man" => Some(Self::Male),
      "f" | "female" | "woman" => Some(Self::Female),
      _ => Some(Self::Other),
    }
  }
}

const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

/// Canonicalise a blood group such as `"o positive"` or `"B+ve"` to `"O+"` /
/// `"B+"`. Unrecognised input is returned uppercased without whitespace.
pub fn normalize_blood_group(raw: &str) -> String {
  let mut s: String = raw
    .chars()
    .filter(|c| !c.is_whitespace())
    .collect::<String>()
    .to_uppercase();

  s = s.replacen("POSITIVE", "+", 1).replacen("NEGATIVE", "-", 1);
  if let Some(rest) = s.strip_suffix("VE") {
    s = rest.to_owned();
  }
  if let Some(rest) = s.strip_suffix("PLUS").or_else(|| s.strip_suffix("POS")) {
    s = format!("{rest}+");
  } else if let Some(rest) = s.strip_suffix("MINUS").or_else(|| s.strip_suffix("NEG")) {
    s = format!("{rest}-");
  }

  if BLOOD_GROUPS.contains(&s.as_str()) {
    return s;
  }
  if matches!(s.as_str(), "A" | "B" | "AB" | "O") {
    return format!("{s}+");
  }
  s
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Personal, location, and contact fields collected by the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberProfile {
  pub name:         String,
  pub email:        String,
  pub state:        String,
  pub district:     String,
  pub subdistrict:  String,
  pub village:      String,
  #[serde(deserialize_with = "lenient_gender")]
  pub gender:       Option<Gender>,
  pub blood_group:  String,
  pub profession:   String,
  /// Tax id (PAN).
  pub pan:          String,
  pub photo_url:    Option<String>,
  pub dob:          Option<NaiveDate>,
  pub renewal_date: Option<NaiveDate>,
}

impl Default for MemberProfile {
  fn default() -> Self {
    Self {
      name:         String::new(),
      email:        String::new(),
      state:        "Maharashtra".to_owned(),
      district:     String::new(),
      subdistrict:  String::new(),
      village:      String::new(),
      gender:       None,
      blood_group:  String::new(),
      profession:   String::new(),
      pan:          String::new(),
      photo_url:    None,
      dob:          None,
      renewal_date: None,
    }
  }
}

/// Legacy documents hold free-form gender text.
fn lenient_gender<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Gender>, D::Error> {
  Ok(Option::<String>::deserialize(d)?.as_deref().and_then(Gender::normalize))
}

impl MemberProfile {
  /// Apply the canonical formatting used for every persisted profile.
  pub fn normalized(mut self) -> Self {
    self.name = self.name.trim().to_owned();
    self.email = self.email.trim().to_owned();
    self.blood_group = normalize_blood_group(&self.blood_group);
    self.pan = self.pan.trim().to_uppercase();
    self.photo_url = self.photo_url.filter(|u| !u.trim().is_empty());
    self
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A member document as read from or written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
  pub phone:             String,
  /// Absent on some legacy documents.
  pub member_id:         Option<MemberId>,
  pub profile:           MemberProfile,
  pub class:             MemberClass,
  /// Only ever set from a usable payment reference.
  pub payment_reference: Option<String>,
  /// Set by the store on first write; preserved by merges.
  pub created_at:        Option<DateTime<Utc>>,
  /// Set by the store on every write.
  pub updated_at:        Option<DateTime<Utc>>,
}

impl MemberRecord {
  /// A blank registration for `phone`, renewing one year after `today`.
  pub fn new_draft(phone: &PhoneNumber, member_id: MemberId, today: NaiveDate) -> Self {
    let profile = MemberProfile {
      renewal_date: today.checked_add_days(Days::new(365)),
      ..MemberProfile::default()
    };
    Self {
      phone: phone.as_str().to_owned(),
      member_id: Some(member_id),
      profile,
      class: MemberClass::default(),
      payment_reference: None,
      created_at: None,
      updated_at: None,
    }
  }

  /// First word of the member's name, if any.
  pub fn short_name(&self) -> Option<&str> {
    self.profile.name.split_whitespace().next()
  }

  /// Whether the stored identifier carries the canonical prefix.
  pub fn has_canonical_id(&self) -> bool {
    self.member_id.as_ref().is_some_and(MemberId::is_canonical)
  }
}

/// A record together with the key it is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMember {
  pub doc_id: DocumentId,
  pub record: MemberRecord,
}
