//! Stored backup artifacts and their naming convention.
//!
//! Artifacts are named `<base>-<YYYYMMDD><suffix>` where the suffix is
//! either empty or starts with a dot (`etc-20240605.tar.xz.gpg`). The
//! embedded date is the only thing the core needs to know about an
//! artifact's content.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::checksum::ChecksumKind;
use crate::{CoreError, Result};

/// strftime pattern of the date embedded in artifact names
pub const DATE_FORMAT: &str = "%Y%m%d";

const DATE_DIGITS: usize = 8;

/// One backup object (local or remote) with the sidecars found next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub date: NaiveDate,
    pub size: u64,
    pub checksums: BTreeSet<ChecksumKind>,
}

impl Artifact {
    /// Build an artifact from its stored name; fails if the name does not
    /// carry a valid date for `base`.
    pub fn from_name(name: &str, base: &str, size: u64) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            date: creation_date(name, base)?,
            size,
            checksums: BTreeSet::new(),
        })
    }

    pub fn with_checksums(mut self, checksums: impl IntoIterator<Item = ChecksumKind>) -> Self {
        self.checksums.extend(checksums);
        self
    }

    /// Age in days relative to `today`
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.date).num_days()
    }

    pub fn sidecar_names(&self) -> Vec<String> {
        self.checksums
            .iter()
            .map(|kind| kind.sidecar_name(&self.name))
            .collect()
    }

    /// Main file first, then every sidecar.
    pub fn related_files(&self) -> Vec<String> {
        let mut files = Vec::with_capacity(1 + self.checksums.len());
        files.push(self.name.clone());
        files.extend(self.sidecar_names());
        files
    }

    /// Sorted, comma-joined sidecar extensions (`"sha1,sha256"`).
    pub fn checksum_list(&self) -> String {
        self.checksums
            .iter()
            .map(|kind| kind.extension())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// `<base>-<YYYYMMDD>`: the stem producers extend with their own suffix.
pub fn dated_stem(base: &str, date: NaiveDate) -> String {
    format!("{}-{}", base, date.format(DATE_FORMAT))
}

/// Whether `name` has the shape of an artifact of `base`: the `<base>-`
/// prefix, eight digits, then either the end of the name or a dot.
pub fn matches_base(name: &str, base: &str) -> bool {
    date_digits(name, base).is_some()
}

/// Creation date encoded in `name`. There is no fallback: a name that does
/// not follow the pattern, or whose digits are not a calendar date, is an
/// error.
pub fn creation_date(name: &str, base: &str) -> Result<NaiveDate> {
    let digits = date_digits(name, base).ok_or_else(|| CoreError::InvalidArtifactName {
        name: name.to_string(),
        reason: format!("expected '{}-YYYYMMDD'", base),
    })?;

    NaiveDate::parse_from_str(digits, DATE_FORMAT).map_err(|e| CoreError::InvalidArtifactName {
        name: name.to_string(),
        reason: format!("'{}' is not a valid date: {}", digits, e),
    })
}

fn date_digits<'a>(name: &'a str, base: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(base)?.strip_prefix('-')?;
    let digits = rest.get(..DATE_DIGITS)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match rest[DATE_DIGITS..].chars().next() {
        None | Some('.') => Some(digits),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_dated_stem() {
        assert_eq!(dated_stem("etc", date(2024, 6, 5)), "etc-20240605");
    }

    #[test]
    fn test_creation_date() {
        assert_eq!(creation_date("etc-20240605.tar.xz", "etc").unwrap(), date(2024, 6, 5));
        assert_eq!(creation_date("etc-20240605", "etc").unwrap(), date(2024, 6, 5));
        assert_eq!(
            creation_date("web-data-20231231.tar.gz.gpg", "web-data").unwrap(),
            date(2023, 12, 31)
        );
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_base("etc-20240605.tar.xz", "etc"));
        assert!(!matches_base("etc-latest.tar.xz", "etc"));
        assert!(!matches_base("etc-2024060.tar", "etc"));
        assert!(!matches_base("etc-202406051.tar", "etc"));
        assert!(!matches_base("etcd-20240605.tar", "etc"));
        assert!(!matches_base("etc-prod-20240605.tar", "etc"));
    }

    #[test]
    fn test_invalid_date_is_an_error() {
        let err = creation_date("etc-20241399.tar", "etc").unwrap_err();
        assert!(matches!(err, CoreError::InvalidArtifactName { .. }));
        assert!(creation_date("other-20240101.tar", "etc").is_err());
    }

    #[test]
    fn test_related_files_and_checksum_list() {
        let artifact = Artifact::from_name("db-20240101.pgdump", "db", 42)
            .unwrap()
            .with_checksums([ChecksumKind::Sha256, ChecksumKind::Sha1]);

        assert_eq!(artifact.checksum_list(), "sha1,sha256");
        assert_eq!(
            artifact.related_files(),
            vec![
                "db-20240101.pgdump".to_string(),
                "db-20240101.pgdump.sha1".to_string(),
                "db-20240101.pgdump.sha256".to_string(),
            ]
        );
        assert_eq!(artifact.age_days(date(2024, 1, 11)), 10);
    }
}
