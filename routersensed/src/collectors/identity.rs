//! Client identity from the `/home/piNN` account convention.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::io;
use std::path::Path;

static CLIENT_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pi(\d{2})$").expect("static client dir pattern"));

/// Two-digit client id of the lowest-sorting matching name, if any.
pub fn client_id_from_names<I, S>(names: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<S> = names.into_iter().collect();
    names.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
    names.iter().find_map(|name| {
        CLIENT_DIR
            .captures(name.as_ref())
            .map(|caps| caps[1].to_string())
    })
}

/// Scans `home` for account directories. Unreadable homes resolve to `None`.
pub async fn resolve_client_id(home: &Path) -> Option<String> {
    let mut entries = match tokio::fs::read_dir(home).await {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("[identity] cannot list {}: {err}", home.display());
            return None;
        }
    };

    let mut names = Vec::new();
    loop {
        let next = entries
            .next_entry()
            .await
            .map(|entry| entry.map(|e| e.file_name()));
        if !record_entry(&mut names, home, next) {
            break;
        }
    }
    client_id_from_names(names)
}

/// Adds one listing result to `names`. Returns false once the scan is over;
/// a listing error ends it early but keeps what was already read.
fn record_entry(names: &mut Vec<String>, home: &Path, next: io::Result<Option<OsString>>) -> bool {
    match next {
        Ok(Some(name)) => {
            if let Some(name) = name.to_str() {
                names.push(name.to_string());
            }
            true
        }
        Ok(None) => false,
        Err(err) => {
            log::warn!(
                "[identity] listing {} stopped after {} entries: {err}",
                home.display(),
                names.len()
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_two_digit_suffix_only() {
        assert_eq!(client_id_from_names(["pi07"]).as_deref(), Some("07"));
        assert_eq!(client_id_from_names(["pi7", "pi123", "pix1", "ubuntu"]), None);
        assert_eq!(client_id_from_names(["apl01"]), None);
    }

    #[test]
    fn lowest_name_wins() {
        let id = client_id_from_names(["ubuntu", "pi42", "pi03"]);
        assert_eq!(id.as_deref(), Some("03"));
    }

    #[tokio::test]
    async fn scans_home_directory() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join("admin")).unwrap();
        std::fs::create_dir(home.path().join("pi15")).unwrap();
        assert_eq!(
            resolve_client_id(home.path()).await.as_deref(),
            Some("15")
        );
    }

    #[test]
    fn listing_error_ends_scan_but_keeps_entries() {
        let home = Path::new("/home");
        let mut names = Vec::new();
        assert!(record_entry(&mut names, home, Ok(Some("pi04".into()))));
        let err = io::Error::other("stale handle");
        assert!(!record_entry(&mut names, home, Err(err)));
        assert_eq!(names, ["pi04"]);
        assert_eq!(client_id_from_names(names).as_deref(), Some("04"));
    }

    #[tokio::test]
    async fn missing_home_has_no_identity() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(resolve_client_id(&home.path().join("nope")).await, None);
    }
}
