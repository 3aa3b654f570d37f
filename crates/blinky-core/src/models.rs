//! Data models for Blinky
//!
//! A `Section` is a named group of `Link`s and the unit of conflict
//! resolution: any change to a section, including changes to its links,
//! bumps the section's `last_updated` timestamp.
//!
//! The JSON field names (`lastUpdated` and friends) match the format already
//! persisted by existing installs.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::id::generate_id;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Errors raised while building models from user input
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// The input could not be turned into an absolute URL
    #[error("Invalid URL '{0}'. Example: https://google.com")]
    InvalidUrl(String),
}

/// A bookmark entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    /// Assigned by the remote store on first upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Absolute URL
    #[serde(default)]
    pub url: String,
    /// Host of `url`, derived once at creation
    #[serde(default)]
    pub domain: String,
    /// Display label
    #[serde(default)]
    pub name: String,
}

impl Link {
    /// Create a link, deriving `domain` from the URL
    ///
    /// Inputs without a scheme are retried with `https://`. If the host still
    /// can't be determined the raw text is used as the domain.
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        let url = url.into();
        let domain = derive_domain(&url);
        Self {
            id: None,
            url,
            domain,
            name: name.into(),
        }
    }

    /// Build a link from free-form user input
    ///
    /// Adds `https://` when no scheme is given, validates the result, and
    /// names the link after the registrable part of the host when `name` is
    /// absent (`news.example.com` becomes `example`).
    pub fn parse(input: &str, name: Option<&str>) -> Result<Self, ModelError> {
        let input = input.trim();
        let normalized = if input.starts_with("http://") || input.starts_with("https://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let parsed =
            Url::parse(&normalized).map_err(|_| ModelError::InvalidUrl(input.to_string()))?;
        let domain = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ModelError::InvalidUrl(input.to_string()))?
            .to_string();

        let name = match name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => default_link_name(&domain),
        };

        Ok(Self {
            id: None,
            url: normalized,
            domain,
            name,
        })
    }
}

/// A named collection of links
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Stable identifier, the merge key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    #[serde(default)]
    pub title: String,
    /// Links in display order
    #[serde(default)]
    pub links: Vec<Link>,
    /// Epoch milliseconds of the last persisted change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

impl Section {
    /// Create a new section with a generated id
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(generate_id(), title)
    }

    /// Create a section with a specific id
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
            links: Vec::new(),
            last_updated: Some(now_millis()),
        }
    }

    /// The id, if one has been assigned
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Timestamp used for last-write-wins; missing counts as oldest
    pub fn timestamp(&self) -> i64 {
        self.last_updated.unwrap_or(0)
    }

    /// Mark the section as modified now
    ///
    /// The timestamp never moves backwards, so a clock that lags a value
    /// written elsewhere still produces a newer stamp.
    pub fn touch(&mut self) {
        let now = now_millis();
        self.last_updated = Some(match self.last_updated {
            Some(prev) if prev >= now => prev + 1,
            _ => now,
        });
    }

    /// Rename the section
    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    /// Append a link
    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
        self.touch();
    }

    /// Remove the link at `index`, returning it
    pub fn remove_link(&mut self, index: usize) -> Option<Link> {
        if index >= self.links.len() {
            return None;
        }
        let link = self.links.remove(index);
        self.touch();
        Some(link)
    }

    /// Remove every link pointing at `url`, returning how many were removed
    pub fn remove_links_by_url(&mut self, url: &str) -> usize {
        let before = self.links.len();
        self.links.retain(|l| l.url != url);
        let removed = before - self.links.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Change the label of the link at `index`
    pub fn rename_link(&mut self, index: usize, name: impl Into<String>) -> bool {
        match self.links.get_mut(index) {
            Some(link) => {
                link.name = name.into();
                self.touch();
                true
            }
            None => false,
        }
    }
}

/// Id derived from a section title: lowercase, whitespace runs become `-`
pub fn section_slug(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

fn derive_domain(url: &str) -> String {
    if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        return host;
    }
    if let Some(host) = Url::parse(&format!("https://{}", url))
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    {
        return host;
    }
    url.to_string()
}

fn default_link_name(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2].to_string()
    } else {
        parts[0].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_new() {
        let section = Section::new("Work");
        assert!(section.id().unwrap().starts_with("id_"));
        assert_eq!(section.title, "Work");
        assert!(section.links.is_empty());
        assert!(section.last_updated.is_some());
    }

    #[test]
    fn test_missing_timestamp_is_oldest() {
        let mut section = Section::with_id("s1", "Work");
        section.last_updated = None;
        assert_eq!(section.timestamp(), 0);
    }

    #[test]
    fn test_mutations_bump_timestamp() {
        let mut section = Section::with_id("s1", "Work");
        section.last_updated = Some(100);

        section.rename("Office");
        let after_rename = section.timestamp();
        assert!(after_rename > 100);

        section.add_link(Link::new("https://rust-lang.org", "rust"));
        assert!(section.timestamp() > after_rename);
    }

    #[test]
    fn test_touch_never_goes_backwards() {
        let mut section = Section::with_id("s1", "Work");
        let future = now_millis() + 60_000;
        section.last_updated = Some(future);
        section.touch();
        assert_eq!(section.timestamp(), future + 1);
    }

    #[test]
    fn test_remove_link() {
        let mut section = Section::with_id("s1", "Work");
        section.add_link(Link::new("https://a.com", "a"));
        section.add_link(Link::new("https://b.com", "b"));

        let removed = section.remove_link(0).unwrap();
        assert_eq!(removed.url, "https://a.com");
        assert_eq!(section.links.len(), 1);
        assert!(section.remove_link(5).is_none());
    }

    #[test]
    fn test_remove_links_by_url() {
        let mut section = Section::with_id("s1", "Work");
        section.add_link(Link::new("https://a.com", "a"));
        section.add_link(Link::new("https://a.com", "a again"));
        section.add_link(Link::new("https://b.com", "b"));
        section.last_updated = Some(1);

        assert_eq!(section.remove_links_by_url("https://a.com"), 2);
        assert!(section.timestamp() > 1);
        assert_eq!(section.remove_links_by_url("https://missing.com"), 0);
    }

    #[test]
    fn test_rename_link() {
        let mut section = Section::with_id("s1", "Work");
        section.add_link(Link::new("https://a.com", "a"));
        assert!(section.rename_link(0, "Alpha"));
        assert_eq!(section.links[0].name, "Alpha");
        assert!(!section.rename_link(3, "nope"));
    }

    #[test]
    fn test_link_domain_derivation() {
        assert_eq!(Link::new("https://news.ycombinator.com/item", "hn").domain, "news.ycombinator.com");
        assert_eq!(Link::new("example.org/path", "ex").domain, "example.org");
        assert_eq!(Link::new("not a url", "raw").domain, "not a url");
    }

    #[test]
    fn test_link_parse() {
        let link = Link::parse("www.google.com/search", None).unwrap();
        assert_eq!(link.url, "https://www.google.com/search");
        assert_eq!(link.domain, "www.google.com");
        assert_eq!(link.name, "google");

        let link = Link::parse("http://example.com", Some("Example")).unwrap();
        assert_eq!(link.url, "http://example.com");
        assert_eq!(link.name, "Example");

        let link = Link::parse("localhost", None).unwrap();
        assert_eq!(link.name, "localhost");

        assert!(matches!(
            Link::parse("https://", None),
            Err(ModelError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_section_slug() {
        assert_eq!(section_slug("Work Stuff"), "work-stuff");
        assert_eq!(section_slug("  Reading   List "), "reading-list");
    }

    #[test]
    fn test_wire_format() {
        let mut section = Section::with_id("s1", "Work");
        section.last_updated = Some(200);
        section.links.push(Link::new("https://x.com", "x"));

        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["id"], "s1");
        assert_eq!(json["lastUpdated"], 200);
        assert_eq!(json["links"][0]["domain"], "x.com");
        assert!(json["links"][0].get("id").is_none());
    }

    #[test]
    fn test_parse_legacy_payload() {
        // Older payloads carry extra link fields and no timestamp
        let raw = r#"[{"title":"work","id":"work","links":[
            {"blockName":"work","ulId":"workList","url":"https://a.com","domain":"a.com","name":"a"}
        ]}]"#;
        let sections: Vec<Section> = serde_json::from_str(raw).unwrap();
        assert_eq!(sections[0].id(), Some("work"));
        assert_eq!(sections[0].last_updated, None);
        assert_eq!(sections[0].links[0].name, "a");
    }
}
