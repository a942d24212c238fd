//! Candidate profile snapshot and field-mapping vocabulary.
//!
//! The snapshot is a read-only view supplied by the profile collaborator at
//! execution time; the engine neither stores nor mutates candidate data.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
}

/// One employment entry. Dates are kept as the collaborator renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub employer: String,
    pub title: String,
    pub start: String,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub institution: String,
    pub credential: Option<String>,
}

/// Application-relevant slice of a candidate's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub full_name: String,
    pub contact: ContactInfo,
    pub work_history: Vec<WorkEntry>,
    pub education: Vec<EducationEntry>,

    /// URI of the stored resume document, if one exists.
    pub resume_reference: Option<String>,
}

/// The vocabulary a field-mapping table draws from. Each external form field
/// maps to exactly one of these sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    FullName,
    Email,
    Phone,
    Location,
    ResumeReference,
    WorkHistory,
    Education,
}

impl ProfileSnapshot {
    /// Resolve one mapping-table source to a fill value. Structured sections
    /// are rendered as JSON; `None` means the snapshot has nothing honest to
    /// offer for that source.
    pub fn field(&self, field: ProfileField) -> Option<String> {
        match field {
            ProfileField::FullName => Some(self.full_name.clone()),
            ProfileField::Email => Some(self.contact.email.clone()),
            ProfileField::Phone => self.contact.phone.clone(),
            ProfileField::Location => self.contact.location.clone(),
            ProfileField::ResumeReference => self.resume_reference.clone(),
            ProfileField::WorkHistory => {
                if self.work_history.is_empty() {
                    None
                } else {
                    serde_json::to_string(&self.work_history).ok()
                }
            }
            ProfileField::Education => {
                if self.education.is_empty() {
                    None
                } else {
                    serde_json::to_string(&self.education).ok()
                }
            }
        }
    }
}

/// Job-lookup result: where to apply and which site policy governs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub external_apply_url: String,
    pub target_host: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn snapshot() -> ProfileSnapshot {
        ProfileSnapshot {
            full_name: "Dana Osei".into(),
            contact: ContactInfo {
                email: "dana@example.net".into(),
                phone: None,
                location: Some("Lisbon".into()),
            },
            work_history: vec![WorkEntry {
                employer: "Acme".into(),
                title: "Engineer".into(),
                start: "2021-03".into(),
                end: None,
            }],
            education: vec![],
            resume_reference: Some("s3://resumes/dana.pdf".into()),
        }
    }

    #[rstest]
    #[case::name(ProfileField::FullName, true)]
    #[case::email(ProfileField::Email, true)]
    #[case::phone(ProfileField::Phone, false)]
    #[case::location(ProfileField::Location, true)]
    #[case::resume(ProfileField::ResumeReference, true)]
    #[case::work(ProfileField::WorkHistory, true)]
    #[case::education(ProfileField::Education, false)]
    fn field_resolution(#[case] field: ProfileField, #[case] present: bool) {
        assert_eq!(snapshot().field(field).is_some(), present);
    }

    #[test]
    fn work_history_renders_as_json() {
        let value = snapshot().field(ProfileField::WorkHistory).unwrap();
        let parsed: Vec<WorkEntry> = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed[0].employer, "Acme");
    }
}
