use std::fmt::Display;

use serde::{Deserialize, Serialize, Serializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Whether the video is a regular upload, currently streaming, or scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveState {
    #[default]
    None,
    Live,
    Upcoming,
}

impl LiveState {
    /// Classify the extraction service `live_status` field.
    ///
    /// Anything other than `is_live` or `is_upcoming` (including `was_live`,
    /// `post_live` or a missing field) is a regular video.
    pub fn from_status(status: Option<&str>) -> Self {
        match status {
            Some("is_live") => LiveState::Live,
            Some("is_upcoming") => LiveState::Upcoming,
            _ => LiveState::None,
        }
    }
}

/// Descriptive metadata of a video, immutable once probed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub duration: Option<u64>,
    pub live_state: LiveState,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub scheduled_start: Option<OffsetDateTime>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
}

impl VideoMetadata {
    pub fn is_live(&self) -> bool {
        self.live_state == LiveState::Live
    }

    pub fn is_scheduled(&self) -> bool {
        self.live_state == LiveState::Upcoming
    }
}

impl Display for VideoMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.title, self.id)?;
        match self.live_state {
            LiveState::None => Ok(()),
            LiveState::Live => write!(f, " [live]"),
            LiveState::Upcoming => write!(f, " [upcoming]"),
        }
    }
}

/// The subset of the extraction service JSON dump we care about.
///
/// Every field is optional: the service omits keys freely depending
/// on the site and the video state.
#[derive(Debug, Default, Deserialize)]
pub struct RawVideoInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub live_status: Option<String>,
    #[serde(default)]
    pub release_timestamp: Option<i64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub upload_date: Option<String>,
}

impl From<RawVideoInfo> for VideoMetadata {
    fn from(raw: RawVideoInfo) -> Self {
        let live_state = LiveState::from_status(raw.live_status.as_deref());

        let scheduled_start = match (live_state, raw.release_timestamp) {
            (LiveState::Upcoming, Some(ts)) => OffsetDateTime::from_unix_timestamp(ts).ok(),
            _ => None,
        };

        Self {
            id: raw.id.unwrap_or_default(),
            title: raw.title.unwrap_or_default(),
            // The service reports fractional seconds for some sites
            duration: raw.duration.filter(|d| *d >= 0.0).map(|d| d as u64),
            live_state,
            scheduled_start,
            thumbnail: raw.thumbnail,
            uploader: raw.uploader,
            view_count: raw.view_count,
            upload_date: raw.upload_date,
        }
    }
}

fn serialize_rfc3339<S: Serializer>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => {
            let formatted = dt.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
            serializer.serialize_some(&formatted)
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> VideoMetadata {
        serde_json::from_str::<RawVideoInfo>(json).unwrap().into()
    }

    #[test]
    fn regular_video() {
        let meta = parse(
            r#"{"id":"dQw4w9WgXcQ","title":"Test Video","duration":212,
                "live_status":"not_live","thumbnail":"https://example.com/thumb.jpg",
                "uploader":"Test Channel","view_count":1000000,"upload_date":"20230101",
                "formats":[{"format_id":"18"}]}"#,
        );

        assert_eq!(meta.id, "dQw4w9WgXcQ");
        assert_eq!(meta.duration, Some(212));
        assert_eq!(meta.live_state, LiveState::None);
        assert_eq!(meta.scheduled_start, None);
        assert_eq!(meta.view_count, Some(1_000_000));
    }

    #[test]
    fn live_stream_has_no_duration() {
        let meta = parse(
            r#"{"id":"live123","title":"Live","duration":null,"live_status":"is_live"}"#,
        );

        assert!(meta.is_live());
        assert_eq!(meta.duration, None);
        assert_eq!(meta.scheduled_start, None);
    }

    #[test]
    fn upcoming_with_release_time() {
        let meta = parse(
            r#"{"id":"scheduled123","title":"Soon","live_status":"is_upcoming",
                "release_timestamp":1735689600}"#,
        );

        assert!(meta.is_scheduled());
        let start = meta.scheduled_start.unwrap();
        assert_eq!(start.unix_timestamp(), 1_735_689_600);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["scheduled_start"], "2025-01-01T00:00:00Z");
        assert_eq!(json["live_state"], "upcoming");
    }

    #[test]
    fn release_time_ignored_unless_upcoming() {
        let meta = parse(r#"{"id":"x","live_status":"was_live","release_timestamp":1735689600}"#);
        assert_eq!(meta.live_state, LiveState::None);
        assert_eq!(meta.scheduled_start, None);
    }

    #[test]
    fn minimal_dump_uses_defaults() {
        let meta = parse("{}");
        assert_eq!(meta.id, "");
        assert_eq!(meta.title, "");
        assert_eq!(meta.uploader, None);
    }
}
