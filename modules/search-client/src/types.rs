use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, SearchError};

// --- Request types ---

/// The upstream family a client talks to. Decides both the request shape and
/// which response parser is applied to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    AdLibrary,
    WebSearch,
    ImageSearch,
    SocialPosts,
    /// Unknown layout. Items are kept as raw JSON and read best-effort.
    Generic,
}

/// Publisher platform filter forwarded to upstreams that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Facebook,
    Instagram,
    Messenger,
    AudienceNetwork,
    Threads,
    X,
    TikTok,
    Reddit,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Messenger => "messenger",
            Platform::AudienceNetwork => "audience_network",
            Platform::Threads => "threads",
            Platform::X => "x",
            Platform::TikTok => "tiktok",
            Platform::Reddit => "reddit",
            Platform::Web => "web",
        }
    }
}

/// One page worth of search parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub locale: Option<String>,
    pub platforms: Vec<Platform>,
    pub active_only: bool,
    pub offset: u32,
    pub limit: u32,
}

impl SearchRequest {
    /// 1-based page number for upstreams that paginate by page instead of offset.
    pub fn page(&self) -> u32 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }

    /// Query parameters for GET-style upstreams.
    pub(crate) fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", self.query.clone()),
            ("offset", self.offset.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(locale) = &self.locale {
            params.push(("country", locale.clone()));
        }
        if !self.platforms.is_empty() {
            let joined = self
                .platforms
                .iter()
                .map(Platform::as_str)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("platforms", joined));
        }
        if self.active_only {
            params.push(("active_status", "active".to_string()));
        }
        params
    }
}

/// POST body for Serper-style web and image search.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WebSearchInput<'a> {
    pub q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gl: Option<&'a str>,
    pub num: u32,
    pub page: u32,
}

impl<'a> From<&'a SearchRequest> for WebSearchInput<'a> {
    fn from(req: &'a SearchRequest) -> Self {
        Self {
            q: &req.query,
            gl: req.locale.as_deref(),
            num: req.limit,
            page: req.page(),
        }
    }
}

// --- Ad library types ---

/// A single archived ad.
#[derive(Debug, Clone, Deserialize)]
pub struct AdLibraryAd {
    #[serde(alias = "adArchiveID", alias = "adArchiveId", deserialize_with = "string_or_number")]
    pub ad_archive_id: String,
    #[serde(alias = "pageName")]
    pub page_name: Option<String>,
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
    #[serde(alias = "startDate")]
    pub start_date: Option<Value>,
    #[serde(alias = "endDate")]
    pub end_date: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snapshot: AdSnapshot,
}

/// Creative content of an ad. Most fields are absent for any given ad.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdSnapshot {
    pub body: Option<AdBody>,
    pub title: Option<String>,
    #[serde(alias = "linkUrl")]
    pub link_url: Option<String>,
    #[serde(alias = "linkDescription")]
    pub link_description: Option<String>,
    #[serde(alias = "pageName")]
    pub page_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cards: Vec<AdCard>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<AdImage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub videos: Vec<AdVideo>,
}

/// Ad bodies arrive either as `{"text": "..."}` or as a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AdBody {
    Text { text: Option<String> },
    Plain(String),
}

impl AdBody {
    pub fn text(&self) -> Option<&str> {
        match self {
            AdBody::Text { text } => text.as_deref(),
            AdBody::Plain(text) => Some(text),
        }
    }
}

/// One card of a carousel ad.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdCard {
    pub body: Option<String>,
    pub title: Option<String>,
    #[serde(alias = "linkUrl")]
    pub link_url: Option<String>,
    #[serde(alias = "linkDescription")]
    pub link_description: Option<String>,
    #[serde(alias = "originalImageUrl")]
    pub original_image_url: Option<String>,
    #[serde(alias = "resizedImageUrl")]
    pub resized_image_url: Option<String>,
    #[serde(alias = "watermarkedResizedImageUrl")]
    pub watermarked_resized_image_url: Option<String>,
    #[serde(alias = "videoPreviewImageUrl")]
    pub video_preview_image_url: Option<String>,
    #[serde(alias = "videoHdUrl")]
    pub video_hd_url: Option<String>,
    #[serde(alias = "videoSdUrl")]
    pub video_sd_url: Option<String>,
    #[serde(alias = "watermarkedVideoHdUrl")]
    pub watermarked_video_hd_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdImage {
    #[serde(alias = "originalImageUrl")]
    pub original_image_url: Option<String>,
    #[serde(alias = "resizedImageUrl")]
    pub resized_image_url: Option<String>,
    #[serde(alias = "watermarkedResizedImageUrl")]
    pub watermarked_resized_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdVideo {
    #[serde(alias = "videoHdUrl")]
    pub video_hd_url: Option<String>,
    #[serde(alias = "videoSdUrl")]
    pub video_sd_url: Option<String>,
    #[serde(alias = "videoPreviewImageUrl")]
    pub video_preview_image_url: Option<String>,
    #[serde(alias = "watermarkedVideoHdUrl")]
    pub watermarked_video_hd_url: Option<String>,
}

// --- Web and image search types ---

/// A single organic web search result.
#[derive(Debug, Clone, Deserialize)]
pub struct WebResult {
    pub link: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub date: Option<String>,
    pub position: Option<u32>,
}

/// A single image search result.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageResult {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub link: Option<String>,
}

// --- Social post types ---

/// A social post as returned by dataset-style scrapers. Field names differ per
/// actor, so the common spellings are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct SocialPost {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(alias = "caption", alias = "body")]
    pub text: Option<String>,
    pub title: Option<String>,
    #[serde(alias = "ownerUsername", alias = "userName", alias = "username", alias = "pageName")]
    pub author: Option<String>,
    #[serde(alias = "postUrl", alias = "webVideoUrl")]
    pub url: Option<String>,
    #[serde(alias = "created_at", alias = "createdAt", alias = "createTimeISO", alias = "time")]
    pub timestamp: Option<Value>,
    #[serde(alias = "displayUrl", alias = "imageUrl")]
    pub display_url: Option<String>,
    #[serde(alias = "videoUrl")]
    pub video_url: Option<String>,
    #[serde(default, alias = "imageUrls", deserialize_with = "null_as_default")]
    pub images: Vec<String>,
}

// --- Raw item union ---

/// An item exactly as fetched, tagged by the parser that produced it.
#[derive(Debug, Clone)]
pub enum RawItem {
    Ad(AdLibraryAd),
    Web(WebResult),
    Image(ImageResult),
    Post(SocialPost),
    Unknown(Value),
}

/// Collection keys tried, in order, for each upstream.
fn collection_keys(upstream: Upstream) -> &'static [&'static str] {
    match upstream {
        Upstream::AdLibrary => &["data", "searchResults", "results", "ads"],
        Upstream::WebSearch => &["organic"],
        Upstream::ImageSearch => &["images"],
        Upstream::SocialPosts => &["items", "data", "posts"],
        Upstream::Generic => &["items", "data", "results"],
    }
}

/// Parse a response payload into raw items using the upstream's parser.
///
/// A payload without the expected collection is `Malformed`. Individual
/// entries that fail their variant parser are skipped and logged.
pub fn parse_items(upstream: Upstream, payload: Value) -> Result<Vec<RawItem>> {
    let keys = collection_keys(upstream);
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(entries)) => Some(entries),
                _ => None,
            })
            .ok_or_else(|| {
                SearchError::Malformed(format!(
                    "{upstream:?} payload has no array under any of {keys:?}"
                ))
            })?,
        other => {
            return Err(SearchError::Malformed(format!(
                "{upstream:?} payload is not an object or array: {}",
                json_kind(&other)
            )))
        }
    };

    let items = match upstream {
        Upstream::AdLibrary => parse_each(entries, RawItem::Ad),
        Upstream::WebSearch => parse_each(entries, RawItem::Web),
        Upstream::ImageSearch => parse_each(entries, RawItem::Image),
        Upstream::SocialPosts => parse_each(entries, RawItem::Post),
        Upstream::Generic => entries
            .into_iter()
            .filter(Value::is_object)
            .map(RawItem::Unknown)
            .collect(),
    };
    Ok(items)
}

fn parse_each<T: DeserializeOwned>(entries: Vec<Value>, wrap: fn(T) -> RawItem) -> Vec<RawItem> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry) {
            Ok(parsed) => Some(wrap(parsed)),
            Err(e) => {
                warn!(error = %e, "Skipping unparseable search item");
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// --- Deserialize helpers ---

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or number id"))
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {}",
            json_kind(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_ad_library_envelope() {
        let payload = json!({
            "data": [{
                "ad_archive_id": 123456789,
                "page_name": "Acme Audio",
                "is_active": true,
                "start_date": 1700000000,
                "snapshot": {
                    "body": {"text": "<p>Hear everything</p>"},
                    "title": "Acme Buds",
                    "cards": null,
                    "images": [{"original_image_url": "https://cdn.example/a.jpg"}]
                }
            }]
        });
        let items = parse_items(Upstream::AdLibrary, payload).unwrap();
        assert_eq!(items.len(), 1);
        let RawItem::Ad(ad) = &items[0] else {
            panic!("expected an ad");
        };
        assert_eq!(ad.ad_archive_id, "123456789");
        assert!(ad.snapshot.cards.is_empty());
        assert_eq!(ad.snapshot.images.len(), 1);
        assert_eq!(
            ad.snapshot.body.as_ref().and_then(AdBody::text),
            Some("<p>Hear everything</p>")
        );
    }

    #[test]
    fn accepts_camel_case_ad_fields_and_plain_body() {
        let payload = json!([{
            "adArchiveID": "987",
            "pageName": "Acme",
            "isActive": false,
            "snapshot": {"body": "plain words", "linkUrl": "https://acme.example"}
        }]);
        let items = parse_items(Upstream::AdLibrary, payload).unwrap();
        let RawItem::Ad(ad) = &items[0] else {
            panic!("expected an ad");
        };
        assert_eq!(ad.ad_archive_id, "987");
        assert_eq!(ad.is_active, Some(false));
        assert_eq!(ad.snapshot.link_url.as_deref(), Some("https://acme.example"));
        assert_eq!(ad.snapshot.body.as_ref().and_then(AdBody::text), Some("plain words"));
    }

    #[test]
    fn skips_entries_that_fail_their_parser() {
        let payload = json!({
            "organic": [
                {"link": "https://a.example", "title": "A"},
                {"title": "missing link"},
                {"link": "https://b.example", "snippet": "B"}
            ]
        });
        let items = parse_items(Upstream::WebSearch, payload).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn missing_collection_is_malformed() {
        let err = parse_items(Upstream::WebSearch, json!({"images": []})).unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));

        let err = parse_items(Upstream::Generic, json!("nope")).unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
    }

    #[test]
    fn social_post_aliases() {
        let payload = json!([{
            "id": "Cx1",
            "caption": "New drop",
            "ownerUsername": "acme",
            "displayUrl": "https://cdn.example/p.jpg",
            "timestamp": "2024-05-01T12:00:00Z"
        }]);
        let items = parse_items(Upstream::SocialPosts, payload).unwrap();
        let RawItem::Post(post) = &items[0] else {
            panic!("expected a post");
        };
        assert_eq!(post.id.as_deref(), Some("Cx1"));
        assert_eq!(post.text.as_deref(), Some("New drop"));
        assert_eq!(post.author.as_deref(), Some("acme"));
    }

    #[test]
    fn generic_keeps_objects_only() {
        let payload = json!({"results": [{"id": 1}, 7, {"id": 2}]});
        let items = parse_items(Upstream::Generic, payload).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn request_page_and_params() {
        let req = SearchRequest {
            query: "wireless earbuds".into(),
            locale: Some("US".into()),
            platforms: vec![Platform::Facebook, Platform::Instagram],
            active_only: true,
            offset: 50,
            limit: 25,
        };
        assert_eq!(req.page(), 3);
        let params = req.query_params();
        assert!(params.contains(&("country", "US".to_string())));
        assert!(params.contains(&("platforms", "facebook,instagram".to_string())));
        assert!(params.contains(&("active_status", "active".to_string())));
    }
}
