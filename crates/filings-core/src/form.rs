//! SEC form type definitions.
//!
//! This module defines [`FormType`] for the periodic reports the engine ingests and
//! [`PeriodType`] for the length of the reporting period they cover.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SEC form type of a periodic report.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormType {
    /// Annual report of a domestic filer.
    TenK,
    /// Quarterly report of a domestic filer.
    TenQ,
    /// Annual report of a foreign private issuer.
    TwentyF,
    /// Annual report of a Canadian issuer under the multijurisdictional system.
    FortyF,
    /// Any other form, kept verbatim.
    Other(String),
}

impl FormType {
    /// Parses an SEC form name. Amendments map to their base form.
    #[must_use]
    pub fn from_form(form: &str) -> Self {
        match form.trim().to_uppercase().as_str() {
            "10-K" | "10-K/A" => Self::TenK,
            "10-Q" | "10-Q/A" => Self::TenQ,
            "20-F" | "20-F/A" => Self::TwentyF,
            "40-F" | "40-F/A" => Self::FortyF,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the SEC form name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TenK => "10-K",
            Self::TenQ => "10-Q",
            Self::TwentyF => "20-F",
            Self::FortyF => "40-F",
            Self::Other(form) => form,
        }
    }

    /// Returns true if this form is filed by foreign private issuers.
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        matches!(self, Self::TwentyF | Self::FortyF)
    }

    /// Returns the reporting period covered by this form, if it is periodic.
    #[must_use]
    pub const fn period_type(&self) -> Option<PeriodType> {
        match self {
            Self::TenK | Self::TwentyF | Self::FortyF => Some(PeriodType::Annual),
            Self::TenQ => Some(PeriodType::Quarterly),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FormType {
    fn from(s: &str) -> Self {
        Self::from_form(s)
    }
}

impl From<String> for FormType {
    fn from(s: String) -> Self {
        Self::from_form(&s)
    }
}

impl From<FormType> for String {
    fn from(form: FormType) -> Self {
        form.as_str().to_string()
    }
}

/// Period type for fundamental financial data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    /// Annual reporting period.
    #[default]
    Annual,
    /// Quarterly reporting period.
    Quarterly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_parsing() {
        assert_eq!(FormType::from_form("10-k"), FormType::TenK);
        assert_eq!(FormType::from_form("20-F/A"), FormType::TwentyF);
        assert_eq!(
            FormType::from_form("8-K"),
            FormType::Other("8-K".to_string())
        );
        assert_eq!(FormType::TwentyF.to_string(), "20-F");
    }

    #[test]
    fn test_foreign_and_period() {
        assert!(FormType::TwentyF.is_foreign());
        assert!(!FormType::TenK.is_foreign());
        assert_eq!(FormType::TenQ.period_type(), Some(PeriodType::Quarterly));
        assert_eq!(FormType::Other("S-1".to_string()).period_type(), None);
    }
}
