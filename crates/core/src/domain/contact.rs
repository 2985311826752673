use serde::{Deserialize, Serialize};

use crate::domain::lead::{normalize_email, Lead};

/// Filters handed to the lead source when searching for new contacts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub seniorities: Vec<String>,
    #[serde(default)]
    pub company_sizes: Vec<String>,
    #[serde(default)]
    pub max_results: u32,
}

/// A contact record as returned by the lead source, before deduplication.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContact {
    pub email: Option<String>,
    pub name: Option<String>,
    pub profile_url: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub seniority: Option<String>,
}

impl RawContact {
    /// Normalized email, or `None` when the record has no usable address.
    pub fn usable_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(normalize_email)
            .filter(|email| email.contains('@') && !email.starts_with('@') && !email.ends_with('@'))
    }

    pub fn into_lead(self, now: chrono::DateTime<chrono::Utc>) -> Option<Lead> {
        let email = self.usable_email()?;
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let mut lead = Lead::discovered(&email, name, now);
        lead.profile_url = self.profile_url.filter(|url| !url.trim().is_empty());
        lead.company = self.company;
        lead.title = self.title;
        lead.industry = self.industry;
        lead.location = self.location;
        lead.country = self.country;
        lead.seniority = self.seniority;
        Some(lead)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total_found: u32,
    pub contacts: Vec<RawContact>,
}
