//! In-memory contact list for a dialing session

use crate::errors::DialerError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub called: bool,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            category: None,
            called: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBook {
    contacts: Vec<Contact>,
}

impl ContactBook {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn push(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    /// Distinct categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.contacts
            .iter()
            .filter_map(|c| c.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Contacts in `category`, or every contact when `category` is `None`.
    pub fn filter(&self, category: Option<&str>) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|c| category.map_or(true, |cat| c.category.as_deref() == Some(cat)))
            .cloned()
            .collect()
    }

    /// Mark every contact with this phone number as called. Returns how many matched.
    pub fn mark_called(&mut self, phone: &str) -> usize {
        let mut marked = 0;
        for contact in self.contacts.iter_mut().filter(|c| c.phone == phone) {
            contact.called = true;
            marked += 1;
        }
        marked
    }

    pub fn pending(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().filter(|c| !c.called)
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5,}$").expect("phone pattern is valid"));

/// Validate a number typed or pasted for a manual call: five or more digits.
pub fn validate_phone_number(raw: &str) -> Result<String, DialerError> {
    let number = raw.trim();
    if PHONE_PATTERN.is_match(number) {
        Ok(number.to_string())
    } else {
        Err(DialerError::InvalidPhoneNumber(format!(
            "'{number}' is not a phone number (expected at least 5 digits)"
        )))
    }
}
