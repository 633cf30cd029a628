use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A request body that parsed but failed a field rule.
#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError(format!("{field} is required")));
    }
    Ok(())
}

fn email(field: &str, value: &str) -> Result<(), ValidationError> {
    required(field, value)?;
    if !value.contains('@') {
        return Err(ValidationError(format!("{field} is not a valid email address")));
    }
    Ok(())
}

/// Keeps an explicit `null` apart from an absent field: absent is `None`,
/// `null` is `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Stored administrator credential. Provisioned out of band, never through
/// the API.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdminIdentity {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

// --- Admissions ---

/// Public admission form body.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdmissionForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub program: Option<String>,
    pub qualification: Option<String>,
    pub school: Option<String>,
    pub board: Option<String>,
    pub passing_year: Option<String>,
    pub percentage: Option<String>,
    pub hostel_required: Option<String>,
    pub how_did_you_hear: Option<String>,
    pub questions: Option<String>,
    pub agree_to_terms: Option<String>,
    pub confirm_information: Option<String>,
}

impl AdmissionForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("firstName", &self.first_name)?;
        required("lastName", &self.last_name)?;
        email("email", &self.email)?;
        required("phone", &self.phone)
    }
}

/// A submitted application as stored and listed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Applicant-facing reference, `MNI-` followed by six digits.
    pub unique_key: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub program: Option<String>,
    pub qualification: Option<String>,
    pub school: Option<String>,
    pub board: Option<String>,
    pub passing_year: Option<String>,
    pub percentage: Option<String>,
    pub hostel_required: Option<String>,
    pub how_did_you_hear: Option<String>,
    pub questions: Option<String>,
    pub agree_to_terms: Option<String>,
    pub confirm_information: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Admission {
    pub fn from_form(form: AdmissionForm, unique_key: String, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            unique_key,
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
            phone: form.phone,
            dob: form.dob,
            gender: form.gender,
            address: form.address,
            city: form.city,
            state: form.state,
            pincode: form.pincode,
            program: form.program,
            qualification: form.qualification,
            school: form.school,
            board: form.board,
            passing_year: form.passing_year,
            percentage: form.percentage,
            hostel_required: form.hostel_required,
            how_did_you_hear: form.how_did_you_hear,
            questions: form.questions,
            agree_to_terms: form.agree_to_terms,
            confirm_information: form.confirm_information,
            submitted_at,
        }
    }
}

// --- Contact messages ---

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("name", &self.name)?;
        email("email", &self.email)?;
        required("message", &self.message)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn from_form(form: ContactForm, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: form.name,
            email: form.email,
            phone: form.phone,
            subject: form.subject,
            message: form.message,
            submitted_at,
        }
    }
}

// --- News ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct News {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub date: DateTime<Utc>,
    pub visible: bool,
}

/// Body of an admin news post.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewsDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub visible: Option<bool>,
}

impl NewsDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("title", &self.title)
    }

    pub fn into_news(self, date: DateTime<Utc>) -> News {
        News {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            image_url: self.image_url,
            date,
            visible: self.visible.unwrap_or(true),
        }
    }
}

/// Partial update; absent fields are left alone and `"imageUrl": null`
/// removes the image.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewsUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
    pub date: Option<DateTime<Utc>>,
    pub visible: Option<bool>,
}

impl NewsUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.title {
            Some(title) => required("title", title),
            None => Ok(()),
        }
    }

    pub fn apply(self, news: &mut News) {
        if let Some(title) = self.title {
            news.title = title;
        }
        if let Some(description) = self.description {
            news.description = description;
        }
        if let Some(image_url) = self.image_url {
            news.image_url = image_url;
        }
        if let Some(date) = self.date {
            news.date = date;
        }
        if let Some(visible) = self.visible {
            news.visible = visible;
        }
    }
}

// --- Bank details ---

/// Single record describing where fees are paid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub ifsc_code: Option<String>,
    pub branch_name: Option<String>,
    pub upi_id: Option<String>,
    pub qr_code_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BankDetailsUpdate {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub account_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub account_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub ifsc_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub upi_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub qr_code_url: Option<Option<String>>,
}

impl BankDetailsUpdate {
    /// Overlay this update on the current record. Fields not supplied keep
    /// their previous value, including the QR code URL; `null` clears one.
    pub fn merge_into(self, current: Option<BankDetails>, now: DateTime<Utc>) -> BankDetails {
        let current = current.unwrap_or(BankDetails {
            account_name: None,
            account_number: None,
            bank_name: None,
            ifsc_code: None,
            branch_name: None,
            upi_id: None,
            qr_code_url: None,
            updated_at: now,
        });
        BankDetails {
            account_name: self.account_name.unwrap_or(current.account_name),
            account_number: self.account_number.unwrap_or(current.account_number),
            bank_name: self.bank_name.unwrap_or(current.bank_name),
            ifsc_code: self.ifsc_code.unwrap_or(current.ifsc_code),
            branch_name: self.branch_name.unwrap_or(current.branch_name),
            upi_id: self.upi_id.unwrap_or(current.upi_id),
            qr_code_url: self.qr_code_url.unwrap_or(current.qr_code_url),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_admission_form_rejects_unknown_fields() {
        let body = json!({
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "phone": "9999999999",
            "isAdmin": true
        });
        assert!(serde_json::from_value::<AdmissionForm>(body).is_err());
    }

    #[test]
    fn test_admission_form_validation() {
        let mut form = AdmissionForm {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            email: "asha@example.com".into(),
            phone: "9999999999".into(),
            ..Default::default()
        };
        assert!(form.validate().is_ok());

        form.email = "not-an-email".into();
        assert_eq!(
            form.validate(),
            Err(ValidationError("email is not a valid email address".into()))
        );

        form.email = "asha@example.com".into();
        form.first_name = "   ".into();
        assert_eq!(form.validate(), Err(ValidationError("firstName is required".into())));
    }

    #[test]
    fn test_admission_serializes_for_dashboard() {
        let form = AdmissionForm {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            email: "asha@example.com".into(),
            phone: "1".into(),
            passing_year: Some("2024".into()),
            ..Default::default()
        };
        let admission = Admission::from_form(form, "MNI-123456".into(), Utc::now());
        let value = serde_json::to_value(&admission).unwrap();
        assert!(value.get("_id").is_some());
        assert_eq!(value["uniqueKey"], "MNI-123456");
        assert_eq!(value["passingYear"], "2024");
        assert!(value.get("submittedAt").is_some());
    }

    #[test]
    fn test_contact_form_rejects_mistyped_field() {
        let body = json!({ "name": "A", "email": "a@b.c", "message": 42 });
        assert!(serde_json::from_value::<ContactForm>(body).is_err());
    }

    #[test]
    fn test_news_draft_defaults_visible() {
        let draft: NewsDraft = serde_json::from_value(json!({ "title": "Results out" })).unwrap();
        let news = draft.into_news(Utc::now());
        assert!(news.visible);
        assert_eq!(news.description, "");
        assert!(news.image_url.is_none());
    }

    #[test]
    fn test_news_update_is_partial() {
        let draft: NewsDraft =
            serde_json::from_value(json!({ "title": "Old", "description": "Body" })).unwrap();
        let mut news = draft.into_news(Utc::now());

        let update: NewsUpdate = serde_json::from_value(json!({ "visible": false })).unwrap();
        update.apply(&mut news);
        assert_eq!(news.title, "Old");
        assert_eq!(news.description, "Body");
        assert!(!news.visible);

        let blank = NewsUpdate {
            title: Some("".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_bank_merge_keeps_previous_qr_code() {
        let first = BankDetailsUpdate {
            account_name: Some(Some("SKM College".into())),
            qr_code_url: Some(Some("https://cdn.example.com/qr.png".into())),
            ..Default::default()
        }
        .merge_into(None, Utc::now());
        assert_eq!(first.account_name.as_deref(), Some("SKM College"));

        let second = BankDetailsUpdate {
            upi_id: Some(Some("skm@upi".into())),
            ..Default::default()
        }
        .merge_into(Some(first.clone()), Utc::now());
        assert_eq!(second.account_name.as_deref(), Some("SKM College"));
        assert_eq!(second.upi_id.as_deref(), Some("skm@upi"));
        assert_eq!(second.qr_code_url, first.qr_code_url);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_explicit_null_clears_optional_fields() {
        let draft: NewsDraft = serde_json::from_value(
            json!({ "title": "Fair", "imageUrl": "https://cdn.example.com/fair.png" }),
        )
        .unwrap();
        let mut news = draft.into_news(Utc::now());

        let untouched: NewsUpdate = serde_json::from_value(json!({ "title": "Book fair" })).unwrap();
        assert!(untouched.image_url.is_none());
        untouched.apply(&mut news);
        assert_eq!(news.image_url.as_deref(), Some("https://cdn.example.com/fair.png"));

        let cleared: NewsUpdate = serde_json::from_value(json!({ "imageUrl": null })).unwrap();
        assert_eq!(cleared.image_url, Some(None));
        cleared.apply(&mut news);
        assert!(news.image_url.is_none());
        assert_eq!(news.title, "Book fair");

        let current = BankDetailsUpdate {
            bank_name: Some(Some("State Bank".into())),
            upi_id: Some(Some("skm@upi".into())),
            ..Default::default()
        }
        .merge_into(None, Utc::now());
        let update: BankDetailsUpdate = serde_json::from_value(json!({ "upiId": null })).unwrap();
        let merged = update.merge_into(Some(current), Utc::now());
        assert_eq!(merged.bank_name.as_deref(), Some("State Bank"));
        assert!(merged.upi_id.is_none());
    }
}
