use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the event store, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which page a view was recorded against.
///
/// Unknown tags are kept verbatim in `Other` so new page types can be
/// tracked before this enum learns about them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageType {
    Home,
    #[default]
    Post,
    Message,
    Music,
    Memories,
    Other(String),
}

impl PageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Home => "home",
            Self::Post => "post",
            Self::Message => "message",
            Self::Music => "music",
            Self::Memories => "memories",
            Self::Other(tag) => tag,
        }
    }

    /// Normalizes an optional caller-supplied tag, defaulting to `post`.
    pub fn normalize(tag: Option<&str>) -> Self {
        match tag.map(str::trim) {
            None | Some("") => Self::Post,
            Some(tag) => Self::from(tag),
        }
    }

    /// The resource kind owning a view counter for this page type, if any.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            Self::Post => Some(ResourceKind::Post),
            Self::Message => Some(ResourceKind::Message),
            _ => None,
        }
    }
}

impl From<&str> for PageType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "home" => Self::Home,
            "post" => Self::Post,
            "message" => Self::Message,
            "music" => Self::Music,
            "memories" => Self::Memories,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for PageType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<PageType> for String {
    fn from(page_type: PageType) -> Self {
        page_type.as_str().to_string()
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trackable entities that carry a cached `view_count` and a display title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Post,
    Message,
}

impl ResourceKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Message => "messages",
        }
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Self::Post => PageType::Post,
            Self::Message => PageType::Message,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => write!(f, "Post"),
            Self::Message => write!(f, "Message"),
        }
    }
}

/// Resolved geography. Both fields are always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
}

impl GeoInfo {
    pub fn new(country: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            city: city.into(),
        }
    }

    pub fn local() -> Self {
        Self::new("Local", "Development")
    }

    pub fn unknown() -> Self {
        Self::new("Unknown", "Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_roundtrip() {
        for tag in ["home", "post", "message", "music", "memories"] {
            assert_eq!(PageType::from(tag).as_str(), tag);
        }
    }

    #[test]
    fn test_page_type_case_insensitive() {
        assert_eq!(PageType::from("Message"), PageType::Message);
        assert_eq!(PageType::from(" HOME "), PageType::Home);
    }

    #[test]
    fn test_page_type_open_ended() {
        let gallery = PageType::from("gallery");
        assert_eq!(gallery, PageType::Other("gallery".to_string()));
        assert_eq!(gallery.as_str(), "gallery");
        assert!(gallery.resource_kind().is_none());
    }

    #[test]
    fn test_page_type_normalize_defaults_to_post() {
        assert_eq!(PageType::normalize(None), PageType::Post);
        assert_eq!(PageType::normalize(Some("")), PageType::Post);
        assert_eq!(PageType::normalize(Some("  ")), PageType::Post);
        assert_eq!(PageType::normalize(Some("music")), PageType::Music);
    }

    #[test]
    fn test_resource_kind_only_for_counted_types() {
        assert_eq!(PageType::Post.resource_kind(), Some(ResourceKind::Post));
        assert_eq!(PageType::Message.resource_kind(), Some(ResourceKind::Message));
        assert!(PageType::Home.resource_kind().is_none());
        assert!(PageType::Music.resource_kind().is_none());
        assert!(PageType::Memories.resource_kind().is_none());
    }

    #[test]
    fn test_resource_kind_tables() {
        assert_eq!(ResourceKind::Post.table(), "posts");
        assert_eq!(ResourceKind::Message.table(), "messages");
        assert_eq!(ResourceKind::Message.page_type(), PageType::Message);
    }

    #[test]
    fn test_page_type_serde_as_string() {
        let json = serde_json::to_string(&PageType::Memories).unwrap();
        assert_eq!(json, "\"memories\"");

        let parsed: PageType = serde_json::from_str("\"message\"").unwrap();
        assert_eq!(parsed, PageType::Message);
    }

    #[test]
    fn test_geo_sentinels() {
        assert_eq!(GeoInfo::local(), GeoInfo::new("Local", "Development"));
        assert_eq!(GeoInfo::unknown(), GeoInfo::new("Unknown", "Unknown"));
    }

    #[test]
    fn test_event_id_display() {
        assert_eq!(EventId(42).to_string(), "42");
    }
}
