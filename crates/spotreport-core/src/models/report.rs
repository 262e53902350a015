use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::artifact::ArtifactKind;
use super::target::SpotTarget;
use super::upload::UploadSnapshot;
use crate::error::PipelineError;

/// Payload keys the pipeline owns; user fields may not shadow them.
const RESERVED_FIELDS: &[&str] = &[
    "imageKey",
    "videoKey",
    "videoThumbnailKey",
    "mediaType",
    "timestamp",
    "clientValidated",
    "spotId",
];

/// Media type sent with a report, derived from the attached keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTypeField {
    Both,
    Image,
    Video,
    None,
}

impl MediaTypeField {
    pub fn derive(image_key: Option<&str>, video_key: Option<&str>) -> Self {
        let has_image = image_key.is_some_and(|k| !k.is_empty());
        let has_video = video_key.is_some_and(|k| !k.is_empty());
        match (has_image, has_video) {
            (true, true) => MediaTypeField::Both,
            (true, false) => MediaTypeField::Image,
            (false, true) => MediaTypeField::Video,
            (false, false) => MediaTypeField::None,
        }
    }
}

/// A report being assembled across pipeline stages.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub id: Uuid,
    pub target: Option<SpotTarget>,
    fields: BTreeMap<String, Value>,
    pub image_key: Option<String>,
    pub video_key: Option<String>,
    pub video_thumbnail_key: Option<String>,
    pub capture_timestamp: Option<DateTime<Utc>>,
}

impl Default for ReportDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportDraft {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            target: None,
            fields: BTreeMap::new(),
            image_key: None,
            video_key: None,
            video_thumbnail_key: None,
            capture_timestamp: None,
        }
    }

    /// Set a user-selected field (e.g. "swellHeight", "crowd").
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), PipelineError> {
        if name.trim().is_empty() || RESERVED_FIELDS.contains(&name) {
            return Err(PipelineError::InvalidState(format!(
                "'{}' cannot be used as a report field name",
                name
            )));
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Copy the keys of completed uploads into the draft. Artifacts that are
    /// not `Completed` leave their key empty.
    pub fn attach_uploads(&mut self, snapshot: &UploadSnapshot) {
        self.image_key = snapshot.completed_key(ArtifactKind::Image).map(String::from);
        self.video_key = snapshot.completed_key(ArtifactKind::Video).map(String::from);
        self.video_thumbnail_key = snapshot
            .completed_key(ArtifactKind::VideoThumbnail)
            .map(String::from);
    }

    /// Every remote key this draft references.
    pub fn remote_keys(&self) -> Vec<&str> {
        [&self.image_key, &self.video_key, &self.video_thumbnail_key]
            .into_iter()
            .filter_map(|k| k.as_deref())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn media_type(&self) -> MediaTypeField {
        MediaTypeField::derive(self.image_key.as_deref(), self.video_key.as_deref())
    }

    /// Build the wire payload. Falls back to the current time when no capture
    /// timestamp was recorded.
    pub fn to_payload(&self) -> ReportPayload {
        let timestamp = self.capture_timestamp.unwrap_or_else(Utc::now);
        ReportPayload {
            fields: self.fields.clone(),
            spot_id: self.target.as_ref().map(SpotTarget::id),
            image_key: self.image_key.clone().unwrap_or_default(),
            video_key: self.video_key.clone().unwrap_or_default(),
            video_thumbnail_key: self.video_thumbnail_key.clone().unwrap_or_default(),
            media_type: self.media_type(),
            timestamp: format_timestamp(timestamp),
            client_validated: true,
        }
    }
}

/// UTC timestamp in `YYYY-MM-DDTHH:MM:SSZ` form.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// JSON body of the report submission request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<String>,
    pub image_key: String,
    pub video_key: String,
    pub video_thumbnail_key: String,
    pub media_type: MediaTypeField,
    pub timestamp: String,
    pub client_validated: bool,
}
