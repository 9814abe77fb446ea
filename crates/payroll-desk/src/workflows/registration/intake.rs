use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use super::domain::{Address, RegistrantData, SubmissionId};

/// Flat payload delivered by the form-submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    #[serde(default)]
    pub submission_id: Option<SubmissionId>,
    pub fields: BTreeMap<String, String>,
}

/// Semantic registrant attribute a form field can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrantField {
    CompanyName,
    CompanyEmail,
    ContactFirstName,
    ContactLastName,
    ContactEmail,
    CompanyPhone,
    UidNumber,
    Street,
    Postcode,
    City,
    Country,
}

impl RegistrantField {
    pub const ALL: [RegistrantField; 11] = [
        Self::CompanyName,
        Self::CompanyEmail,
        Self::ContactFirstName,
        Self::ContactLastName,
        Self::ContactEmail,
        Self::CompanyPhone,
        Self::UidNumber,
        Self::Street,
        Self::Postcode,
        Self::City,
        Self::Country,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Self::CompanyName => "company_name",
            Self::CompanyEmail => "company_email",
            Self::ContactFirstName => "contact_first_name",
            Self::ContactLastName => "contact_last_name",
            Self::ContactEmail => "contact_email",
            Self::CompanyPhone => "company_phone",
            Self::UidNumber => "uid_number",
            Self::Street => "street",
            Self::Postcode => "postcode",
            Self::City => "city",
            Self::Country => "country",
        }
    }
}

/// Versioned table from form field ids to registrant attributes, fixed when
/// the form is defined rather than guessed from labels at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub version: u32,
    pub fields: BTreeMap<String, RegistrantField>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::standard()
    }
}

impl FieldMapping {
    /// Mapping for forms whose field ids are the semantic keys themselves.
    pub fn standard() -> Self {
        let fields = RegistrantField::ALL
            .into_iter()
            .map(|field| (field.key().to_string(), field))
            .collect();
        Self { version: 1, fields }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// Build registrant data from a submission. Unknown field ids are ignored;
    /// when two ids feed the same attribute the first non-empty value wins.
    pub fn registrant_from(&self, submission: &FormSubmission) -> RegistrantData {
        let mut values: BTreeMap<RegistrantField, String> = BTreeMap::new();
        for (field_id, raw) in &submission.fields {
            let Some(field) = self.fields.get(field_id) else {
                continue;
            };
            if let Some(value) = normalize_value(raw) {
                values.entry(*field).or_insert(value);
            }
        }

        let mut take = |field: RegistrantField| values.remove(&field);
        RegistrantData {
            company_name: take(RegistrantField::CompanyName).unwrap_or_default(),
            company_email: take(RegistrantField::CompanyEmail).unwrap_or_default(),
            contact_first_name: take(RegistrantField::ContactFirstName),
            contact_last_name: take(RegistrantField::ContactLastName),
            contact_email: take(RegistrantField::ContactEmail),
            company_phone: take(RegistrantField::CompanyPhone),
            uid_number: take(RegistrantField::UidNumber),
            address: Address {
                street: take(RegistrantField::Street),
                postcode: take(RegistrantField::Postcode),
                city: take(RegistrantField::City),
                country: take(RegistrantField::Country),
            },
        }
    }
}

/// Validation errors raised while accepting a registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("required field missing: {}", .field.key())]
    MissingRequiredField { field: RegistrantField },
    #[error("'{value}' is not a valid e-mail address")]
    InvalidEmail { field: RegistrantField, value: String },
}

/// Normalize free-text values and enforce the required fields.
pub fn sanitize(registrant: RegistrantData) -> Result<RegistrantData, IntakeError> {
    let RegistrantData {
        company_name,
        company_email,
        contact_first_name,
        contact_last_name,
        contact_email,
        company_phone,
        uid_number,
        address,
    } = registrant;

    let company_name = normalize_value(&company_name).ok_or(IntakeError::MissingRequiredField {
        field: RegistrantField::CompanyName,
    })?;
    let company_email =
        normalize_email(&company_email).ok_or(IntakeError::MissingRequiredField {
            field: RegistrantField::CompanyEmail,
        })?;
    ensure_email(RegistrantField::CompanyEmail, &company_email)?;

    let contact_email = contact_email.as_deref().and_then(normalize_email);
    if let Some(email) = &contact_email {
        ensure_email(RegistrantField::ContactEmail, email)?;
    }

    let optional = |value: Option<String>| value.as_deref().and_then(normalize_value);
    Ok(RegistrantData {
        company_name,
        company_email,
        contact_first_name: optional(contact_first_name),
        contact_last_name: optional(contact_last_name),
        contact_email,
        company_phone: optional(company_phone),
        uid_number: uid_number.as_deref().and_then(normalize_uid),
        address: Address {
            street: optional(address.street),
            postcode: optional(address.postcode),
            city: optional(address.city),
            country: optional(address.country),
        },
    })
}

pub(crate) fn normalize_value(value: &str) -> Option<String> {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn normalize_email(value: &str) -> Option<String> {
    normalize_value(value).map(|email| email.to_lowercase())
}

/// VAT ids are compared without spacing, upper case (`ATU12345678`).
fn normalize_uid(value: &str) -> Option<String> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    (!compact.is_empty()).then_some(compact)
}

fn ensure_email(field: RegistrantField, value: &str) -> Result<(), IntakeError> {
    if is_valid_email(value) {
        Ok(())
    } else {
        Err(IntakeError::InvalidEmail {
            field,
            value: value.to_string(),
        })
    }
}

/// Syntactic check only: one `@`, a non-empty local part, and a dotted domain
/// without empty labels.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
pub(crate) fn normalize_for_tests(value: &str) -> Option<String> {
    normalize_value(value)
}
