use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Resume section kinds, one saved document per kind and user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Profile,
    Experience,
    Education,
    Projects,
    Skills,
    Certifications,
    Social,
}

impl SectionKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "profile" => Some(Self::Profile),
            "experience" => Some(Self::Experience),
            "education" => Some(Self::Education),
            "projects" => Some(Self::Projects),
            "skills" => Some(Self::Skills),
            "certifications" => Some(Self::Certifications),
            "social" => Some(Self::Social),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Experience => "experience",
            Self::Education => "education",
            Self::Projects => "projects",
            Self::Skills => "skills",
            Self::Certifications => "certifications",
            Self::Social => "social",
        }
    }
}

/// One stored resume section
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResponse {
    pub kind: String,
    pub content: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<entity::resume_sections::Model> for SectionResponse {
    fn from(section: entity::resume_sections::Model) -> Self {
        Self {
            kind: section.kind,
            content: section.content,
            updated_at: section.updated_at,
        }
    }
}

/// The full resume: every stored section for the caller
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResponse {
    pub sections: Vec<SectionResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_kind_round_trip() {
        for kind in [
            SectionKind::Profile,
            SectionKind::Experience,
            SectionKind::Education,
            SectionKind::Projects,
            SectionKind::Skills,
            SectionKind::Certifications,
            SectionKind::Social,
        ] {
            assert_eq!(SectionKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_section_kind_rejects_unknown() {
        assert_eq!(SectionKind::from_str("hobbies"), None);
    }
}
