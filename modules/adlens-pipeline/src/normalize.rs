use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use search_client::{AdBody, AdLibraryAd, ImageResult, RawItem, SocialPost, WebResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^\w\s.,!?;:'"()&%$#@/+\-]"#).expect("valid regex")
});

const ELLIPSIS: &str = "...";

// --- Output types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    ImageOriginal,
    ImageResized,
    ImageWatermarked,
    /// Still frame of a video. Counts as an image.
    VideoPreview,
    VideoHd,
    VideoSd,
    VideoWatermarked,
}

impl MediaKind {
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            MediaKind::ImageOriginal
                | MediaKind::ImageResized
                | MediaKind::ImageWatermarked
                | MediaKind::VideoPreview
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
}

/// A normalized item, the only item shape handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub source_name: Option<String>,
    /// Plain text, markup stripped, bounded length.
    pub content: String,
    pub title: Option<String>,
    pub media: Vec<MediaRef>,
    pub link: Option<String>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Unset until scored.
    pub relevance: Option<f64>,
}

impl ContentRecord {
    /// Images, including video preview frames.
    pub fn images(&self) -> impl Iterator<Item = &MediaRef> {
        self.media.iter().filter(|m| m.kind.is_image())
    }

    pub fn videos(&self) -> impl Iterator<Item = &MediaRef> {
        self.media.iter().filter(|m| !m.kind.is_image())
    }
}

// --- Text extraction ---

/// The text-bearing fields of a raw item, markup already stripped.
#[derive(Debug, Default)]
pub(crate) struct TextParts {
    pub title: Option<String>,
    pub body: Option<String>,
    pub description: Option<String>,
    /// Card titles and bodies, in card order.
    pub cards: Vec<String>,
}

pub(crate) fn text_parts(item: &RawItem) -> TextParts {
    match item {
        RawItem::Ad(ad) => {
            let snapshot = &ad.snapshot;
            let cards = snapshot
                .cards
                .iter()
                .flat_map(|c| [c.body.as_deref(), c.title.as_deref()])
                .flatten()
                .map(strip_tags)
                .filter(|s| !s.trim().is_empty())
                .collect();
            TextParts {
                title: snapshot.title.as_deref().map(strip_tags),
                body: snapshot.body.as_ref().and_then(AdBody::text).map(strip_tags),
                description: snapshot.link_description.as_deref().map(strip_tags),
                cards,
            }
        }
        RawItem::Web(r) => TextParts {
            title: r.title.as_deref().map(strip_tags),
            body: r.snippet.as_deref().map(strip_tags),
            ..TextParts::default()
        },
        RawItem::Image(r) => TextParts {
            title: r.title.as_deref().map(strip_tags),
            ..TextParts::default()
        },
        RawItem::Post(p) => TextParts {
            title: p.title.as_deref().map(strip_tags),
            body: p.text.as_deref().map(strip_tags),
            ..TextParts::default()
        },
        RawItem::Unknown(v) => TextParts {
            title: first_str(v, &["title", "name", "headline"]).map(strip_tags),
            body: first_str(v, &["text", "body", "content", "caption", "snippet"]).map(strip_tags),
            description: first_str(v, &["description", "summary"]).map(strip_tags),
            ..TextParts::default()
        },
    }
}

/// Stable identifier of a raw item. Unknown items without an id field fall
/// back to a hash of their JSON.
pub(crate) fn stable_id(item: &RawItem) -> String {
    match item {
        RawItem::Ad(ad) => ad.ad_archive_id.clone(),
        RawItem::Web(r) => r.link.clone(),
        RawItem::Image(r) => r.image_url.clone(),
        RawItem::Post(p) => p
            .id
            .clone()
            .or_else(|| p.url.clone())
            .unwrap_or_else(|| hash_id(p.text.as_deref().unwrap_or_default())),
        RawItem::Unknown(v) => match v.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => first_str(v, &["url", "link"])
                .map(str::to_string)
                .unwrap_or_else(|| hash_id(&v.to_string())),
        },
    }
}

fn hash_id(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

// --- Normalization ---

/// Map one raw item to a content record. Missing fields stay absent.
pub fn normalize(item: &RawItem, max_content_len: usize) -> ContentRecord {
    let parts = text_parts(item);

    // cards, body, title, description
    let joined = parts
        .cards
        .iter()
        .map(String::as_str)
        .chain(parts.body.as_deref())
        .chain(parts.title.as_deref())
        .chain(parts.description.as_deref())
        .collect::<Vec<_>>()
        .join(" ");

    let title = parts
        .title
        .as_deref()
        .map(|t| sanitize(t, max_content_len))
        .filter(|t| !t.is_empty());

    let mut record = ContentRecord {
        id: stable_id(item),
        source_name: None,
        content: sanitize(&joined, max_content_len),
        title,
        media: Vec::new(),
        link: None,
        is_active: true,
        created_at: None,
        relevance: None,
    };

    match item {
        RawItem::Ad(ad) => fill_ad(&mut record, ad),
        RawItem::Web(r) => fill_web(&mut record, r),
        RawItem::Image(r) => fill_image(&mut record, r),
        RawItem::Post(p) => fill_post(&mut record, p),
        RawItem::Unknown(v) => fill_unknown(&mut record, v),
    }
    record
}

fn fill_ad(record: &mut ContentRecord, ad: &AdLibraryAd) {
    let snapshot = &ad.snapshot;
    record.source_name = ad.page_name.clone().or_else(|| snapshot.page_name.clone());
    record.is_active = ad.is_active.unwrap_or(true);
    record.created_at = ad.start_date.as_ref().and_then(parse_timestamp);
    record.link = snapshot
        .link_url
        .clone()
        .or_else(|| snapshot.cards.iter().find_map(|c| c.link_url.clone()));

    let mut media = MediaCollector::default();
    for image in &snapshot.images {
        media.push(MediaKind::ImageOriginal, image.original_image_url.as_deref());
        media.push(MediaKind::ImageResized, image.resized_image_url.as_deref());
        media.push(
            MediaKind::ImageWatermarked,
            image.watermarked_resized_image_url.as_deref(),
        );
    }
    for video in &snapshot.videos {
        media.push(MediaKind::VideoHd, video.video_hd_url.as_deref());
        media.push(MediaKind::VideoSd, video.video_sd_url.as_deref());
        media.push(MediaKind::VideoWatermarked, video.watermarked_video_hd_url.as_deref());
        media.push(MediaKind::VideoPreview, video.video_preview_image_url.as_deref());
    }
    for card in &snapshot.cards {
        media.push(MediaKind::ImageOriginal, card.original_image_url.as_deref());
        media.push(MediaKind::ImageResized, card.resized_image_url.as_deref());
        media.push(
            MediaKind::ImageWatermarked,
            card.watermarked_resized_image_url.as_deref(),
        );
        media.push(MediaKind::VideoHd, card.video_hd_url.as_deref());
        media.push(MediaKind::VideoSd, card.video_sd_url.as_deref());
        media.push(MediaKind::VideoWatermarked, card.watermarked_video_hd_url.as_deref());
        media.push(MediaKind::VideoPreview, card.video_preview_image_url.as_deref());
    }
    if let Some(html) = snapshot.body.as_ref().and_then(AdBody::text) {
        media.push_inline_images(html);
    }
    record.media = media.finish();
}

fn fill_web(record: &mut ContentRecord, r: &WebResult) {
    record.link = Some(r.link.clone());
    record.source_name = url::Url::parse(&r.link)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));
    record.created_at = r.date.as_deref().and_then(parse_timestamp_str);
    if let Some(snippet) = &r.snippet {
        let mut media = MediaCollector::default();
        media.push_inline_images(snippet);
        record.media = media.finish();
    }
}

fn fill_image(record: &mut ContentRecord, r: &ImageResult) {
    record.link = r.link.clone();
    record.source_name = r.source.clone();
    let mut media = MediaCollector::default();
    media.push(MediaKind::ImageOriginal, Some(r.image_url.as_str()));
    media.push(MediaKind::ImageResized, r.thumbnail_url.as_deref());
    record.media = media.finish();
}

fn fill_post(record: &mut ContentRecord, p: &SocialPost) {
    record.link = p.url.clone();
    record.source_name = p.author.clone();
    record.created_at = p.timestamp.as_ref().and_then(parse_timestamp);
    let mut media = MediaCollector::default();
    media.push(MediaKind::ImageOriginal, p.display_url.as_deref());
    for url in &p.images {
        media.push(MediaKind::ImageOriginal, Some(url.as_str()));
    }
    media.push(MediaKind::VideoSd, p.video_url.as_deref());
    if let Some(text) = &p.text {
        media.push_inline_images(text);
    }
    record.media = media.finish();
}

fn fill_unknown(record: &mut ContentRecord, v: &Value) {
    record.link = first_str(v, &["url", "link"]).map(str::to_string);
    record.source_name =
        first_str(v, &["source", "author", "page_name", "owner"]).map(str::to_string);
    record.is_active = v.get("is_active").and_then(Value::as_bool).unwrap_or(true);
    record.created_at = ["created_at", "timestamp", "date"]
        .iter()
        .find_map(|key| v.get(*key).and_then(parse_timestamp));
    let mut media = MediaCollector::default();
    media.push(
        MediaKind::ImageOriginal,
        first_str(v, &["image", "image_url", "imageUrl", "thumbnail"]),
    );
    media.push(MediaKind::VideoSd, first_str(v, &["video", "video_url", "videoUrl"]));
    if let Some(html) = first_str(v, &["body", "content", "html"]) {
        media.push_inline_images(html);
    }
    record.media = media.finish();
}

/// Accumulates media references, dropping repeated URLs (first kind wins).
#[derive(Default)]
struct MediaCollector {
    seen: HashSet<String>,
    media: Vec<MediaRef>,
}

impl MediaCollector {
    fn push(&mut self, kind: MediaKind, url: Option<&str>) {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            return;
        };
        if self.seen.insert(url.to_string()) {
            self.media.push(MediaRef {
                kind,
                url: url.to_string(),
            });
        }
    }

    fn push_inline_images(&mut self, html: &str) {
        for cap in IMG_SRC_RE.captures_iter(html) {
            self.push(MediaKind::ImageOriginal, Some(&cap[1]));
        }
    }

    fn finish(self) -> Vec<MediaRef> {
        self.media
    }
}

// --- Text helpers ---

/// Remove markup and decode the handful of entities that show up in ad copy.
pub(crate) fn strip_tags(html: &str) -> String {
    TAG_RE
        .replace_all(html, " ")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace, drop characters outside the allow-list, and bound
/// the length on a word boundary.
pub fn sanitize(text: &str, max_len: usize) -> String {
    let allowed = DISALLOWED_RE.replace_all(text, " ");
    truncate_on_word(&collapse_whitespace(&allowed), max_len)
}

/// Truncate to at most `max_len` characters plus an ellipsis, cutting at the
/// last whitespace so no word is split. A single word longer than the limit
/// is cut hard.
pub fn truncate_on_word(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(max_len)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    // The character at `cut` starting a word means the prefix ends cleanly.
    let head = if text[cut..].starts_with(char::is_whitespace) {
        &text[..cut]
    } else {
        match text[..cut].rfind(char::is_whitespace) {
            Some(space) => &text[..space],
            None => &text[..cut],
        }
    };
    format!("{}{ELLIPSIS}", head.trim_end())
}

fn first_str<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| v.get(*key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

// --- Timestamps ---

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_unix),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Unix seconds (or milliseconds), RFC 3339, or a bare `YYYY-MM-DD` date.
fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return from_unix(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    // Values this large are milliseconds.
    if value > 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}
