use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

static STORE_ID: OnceLock<Regex> = OnceLock::new();

/// Pulls a document or database id out of a store URL.
///
/// Accepts the compact 32-hex form and the hyphenated UUID form, and returns
/// the compact form.
pub fn extract_database_id(url: &str) -> Option<String> {
    let pattern = STORE_ID.get_or_init(|| {
        Regex::new(
            r"([0-9a-f]{32})|([0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12})",
        )
        .expect("Invalid store id regex")
    });
    let found = pattern.find(url)?;
    match Uuid::parse_str(found.as_str()) {
        Ok(id) => Some(id.simple().to_string()),
        Err(e) => {
            log::warn!("Ignoring malformed id {:?} in {url}: {e}", found.as_str());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "https://www.notion.so/team/Tasks-1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d?v=0",
        Some("1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d")
    )]
    #[case(
        "180b95a4-c619-8117-a3ea-cb5f6ed30b24",
        Some("180b95a4c6198117a3eacb5f6ed30b24")
    )]
    #[case("https://example.com/no-id-here", None)]
    fn extracts_compact_ids(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(extract_database_id(url).as_deref(), expected);
    }
}
