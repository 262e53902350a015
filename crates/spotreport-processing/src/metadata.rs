//! Capture-time extraction
//!
//! Sources are consulted lazily in a fixed order and the first hit wins:
//! embedded capture field, embedded modification field, asset-store creation
//! time, asset-store modification time. Every failure along the way is logged
//! at debug and the next source is tried.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use spotreport_core::models::{MediaKind, MediaSelection, TimestampSource};
use std::io::Cursor;
use std::sync::Arc;

use crate::video::VideoProbe;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

// Exif 2.31 offset tags
const OFFSET_TIME: exif::Tag = exif::Tag(exif::Context::Exif, 0x9010);
const OFFSET_TIME_ORIGINAL: exif::Tag = exif::Tag(exif::Context::Exif, 0x9011);

/// Timestamps the platform asset library keeps for a picked item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Platform asset library lookup.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn lookup(&self, asset_id: &str) -> Result<Option<AssetRecord>>;
}

/// Timestamps embedded in the media bytes themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedTimestamps {
    pub capture: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractedTimestamp {
    pub timestamp: DateTime<Utc>,
    pub source: TimestampSource,
}

impl ExtractedTimestamp {
    fn new(timestamp: DateTime<Utc>, source: TimestampSource) -> Self {
        Self { timestamp, source }
    }
}

#[derive(Clone, Default)]
pub struct MetadataExtractor {
    asset_store: Option<Arc<dyn AssetStore>>,
    video_probe: Option<VideoProbe>,
}

impl MetadataExtractor {
    pub fn new(asset_store: Option<Arc<dyn AssetStore>>, video_probe: Option<VideoProbe>) -> Self {
        Self {
            asset_store,
            video_probe,
        }
    }

    /// Find the capture time of `media`, or `None` when no source has one.
    ///
    /// Takes `&mut` only so a video can be staged to disk for ffprobe; the
    /// selection's timestamp is left untouched.
    #[tracing::instrument(skip(self, media), fields(kind = %media.kind()))]
    pub async fn extract_timestamp(&self, media: &mut MediaSelection) -> Option<ExtractedTimestamp> {
        let embedded = self.embedded_timestamps(media).await;
        if let Some(ts) = embedded.capture {
            return Some(ExtractedTimestamp::new(ts, TimestampSource::EmbeddedCapture));
        }
        if let Some(ts) = embedded.modified {
            return Some(ExtractedTimestamp::new(ts, TimestampSource::EmbeddedModified));
        }

        let record = self.asset_record(media.asset_id()?).await?;
        if let Some(ts) = record.created_at {
            return Some(ExtractedTimestamp::new(ts, TimestampSource::AssetCreated));
        }
        if let Some(ts) = record.modified_at {
            return Some(ExtractedTimestamp::new(ts, TimestampSource::AssetModified));
        }

        tracing::debug!("No timestamp source available");
        None
    }

    /// Extract and store the capture time on `media`, falling back to the
    /// current time (unresolved) when nothing could be extracted.
    pub async fn resolve_timestamp(&self, media: &mut MediaSelection) -> ExtractedTimestamp {
        let extracted = self.extract_timestamp(media).await.unwrap_or_else(|| {
            ExtractedTimestamp::new(Utc::now(), TimestampSource::OperatorSupplied)
        });
        media.set_timestamp(extracted.timestamp, extracted.source);
        extracted
    }

    async fn embedded_timestamps(&self, media: &mut MediaSelection) -> EmbeddedTimestamps {
        let result = match media.kind() {
            MediaKind::Image => read_exif_timestamps(media.data()),
            MediaKind::Video => self.read_container_timestamps(media).await,
        };

        result.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Embedded timestamp unavailable");
            EmbeddedTimestamps::default()
        })
    }

    async fn read_container_timestamps(
        &self,
        media: &mut MediaSelection,
    ) -> Result<EmbeddedTimestamps> {
        let probe = self
            .video_probe
            .as_ref()
            .ok_or_else(|| anyhow!("No video probe configured"))?;
        let path = media.staged_path()?;
        let tags = probe.container_tags(path).await?;

        Ok(EmbeddedTimestamps {
            capture: tags.capture_date,
            modified: tags.creation_time,
        })
    }

    async fn asset_record(&self, asset_id: &str) -> Option<AssetRecord> {
        let store = self.asset_store.as_ref()?;
        match store.lookup(asset_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(asset_id = %asset_id, error = %e, "Asset store lookup failed");
                None
            }
        }
    }
}

/// Read `DateTimeOriginal` and `DateTime` from an image's EXIF block.
pub fn read_exif_timestamps(data: &[u8]) -> Result<EmbeddedTimestamps> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .map_err(|e| anyhow!("Failed to read EXIF: {}", e))?;

    let ascii = |tag: exif::Tag| {
        exif.get_field(tag, exif::In::PRIMARY)
            .and_then(|field| match &field.value {
                exif::Value::Ascii(values) => values.first(),
                _ => None,
            })
            .map(|raw| String::from_utf8_lossy(raw).trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let timestamp = |tag: exif::Tag, offset_tag: exif::Tag| {
        ascii(tag).and_then(|raw| parse_exif_datetime(&raw, ascii(offset_tag).as_deref()))
    };

    Ok(EmbeddedTimestamps {
        capture: timestamp(exif::Tag::DateTimeOriginal, OFFSET_TIME_ORIGINAL),
        modified: timestamp(exif::Tag::DateTime, OFFSET_TIME),
    })
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value.
///
/// With an offset (`+02:00`) the value is local time at that offset;
/// without one it is read as UTC.
pub fn parse_exif_datetime(raw: &str, offset: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Some(offset) = offset {
        let with_offset = format!("{} {}", raw, offset.trim());
        if let Ok(dt) =
            DateTime::parse_from_str(&with_offset, &format!("{} %:z", EXIF_DATETIME_FORMAT))
        {
            return Some(dt.with_timezone(&Utc));
        }
    }

    NaiveDateTime::parse_from_str(raw, EXIF_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const EXIF_POINTER: u16 = 0x8769;
    const DATE_TIME: u16 = 0x0132;
    const DATE_TIME_ORIGINAL: u16 = 0x9003;

    /// Minimal JPEG carrying ASCII EXIF fields in IFD0 and the Exif sub-IFD.
    pub(crate) fn jpeg_with_exif(ifd0: &[(u16, &str)], exif_ifd: &[(u16, &str)]) -> Vec<u8> {
        let ifd_size = |entries: usize| 2 + 12 * entries + 4;
        let ifd0_offset = 8;
        let exif_offset = ifd0_offset + ifd_size(ifd0.len() + 1);
        let data_offset = exif_offset + ifd_size(exif_ifd.len());

        let mut data = Vec::new();
        let mut write_ifd = |out: &mut Vec<u8>, entries: &[(u16, &str)], pointer: Option<u32>| {
            let count = entries.len() + usize::from(pointer.is_some());
            out.extend((count as u16).to_le_bytes());
            for (tag, value) in entries {
                let mut bytes = value.as_bytes().to_vec();
                bytes.push(0);
                out.extend(tag.to_le_bytes());
                out.extend(2u16.to_le_bytes());
                out.extend((bytes.len() as u32).to_le_bytes());
                if bytes.len() <= 4 {
                    bytes.resize(4, 0);
                    out.extend(bytes);
                } else {
                    out.extend(((data_offset + data.len()) as u32).to_le_bytes());
                    data.extend(bytes);
                    if data.len() % 2 == 1 {
                        data.push(0);
                    }
                }
            }
            if let Some(pointer) = pointer {
                out.extend(EXIF_POINTER.to_le_bytes());
                out.extend(4u16.to_le_bytes());
                out.extend(1u32.to_le_bytes());
                out.extend(pointer.to_le_bytes());
            }
            out.extend(0u32.to_le_bytes());
        };

        let mut tiff = b"II\x2a\x00\x08\x00\x00\x00".to_vec();
        write_ifd(&mut tiff, ifd0, Some(exif_offset as u32));
        write_ifd(&mut tiff, exif_ifd, None);
        tiff.extend(data);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend(((tiff.len() + 8) as u16).to_be_bytes());
        jpeg.extend(b"Exif\0\0");
        jpeg.extend(tiff);
        jpeg.extend([0xFF, 0xD9]);
        jpeg
    }

    #[derive(Default)]
    struct MockAssetStore {
        records: HashMap<String, AssetRecord>,
        fail: bool,
        lookups: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AssetStore for MockAssetStore {
        async fn lookup(&self, asset_id: &str) -> Result<Option<AssetRecord>> {
            self.lookups.lock().unwrap().push(asset_id.to_string());
            if self.fail {
                return Err(anyhow!("photo library unavailable"));
            }
            Ok(self.records.get(asset_id).cloned())
        }
    }

    fn store_with(asset_id: &str, record: AssetRecord) -> Arc<MockAssetStore> {
        let mut store = MockAssetStore::default();
        store.records.insert(asset_id.to_string(), record);
        Arc::new(store)
    }

    #[test]
    fn test_parse_exif_datetime() {
        assert_eq!(
            parse_exif_datetime("2024:06:01 10:00:00", None),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            parse_exif_datetime("2024:06:01 10:00:00", Some("+02:00")),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
        );
        // Unparseable offset falls back to UTC
        assert_eq!(
            parse_exif_datetime("2024:06:01 10:00:00", Some("local")),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(parse_exif_datetime("0000:00:00 00:00:00", None), None);
        assert_eq!(parse_exif_datetime("", None), None);
    }

    #[test]
    fn test_read_exif_timestamps() {
        let jpeg = jpeg_with_exif(
            &[(DATE_TIME, "2024:06:02 12:00:00")],
            &[(DATE_TIME_ORIGINAL, "2024:06:01 10:00:00"), (0x9011, "+02:00")],
        );

        let ts = read_exif_timestamps(&jpeg).unwrap();
        assert_eq!(ts.capture, Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
        assert_eq!(ts.modified, Some(Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_read_exif_without_exif_is_error() {
        assert!(read_exif_timestamps(b"\xFF\xD8\xFF\xD9").is_err());
    }

    #[tokio::test]
    async fn test_capture_field_wins() {
        let jpeg = jpeg_with_exif(
            &[(DATE_TIME, "2024:06:02 12:00:00")],
            &[(DATE_TIME_ORIGINAL, "2024:06:01 10:00:00")],
        );
        let store = store_with("a1", AssetRecord::default());
        let extractor = MetadataExtractor::new(Some(store.clone()), None);

        let mut media = MediaSelection::image(jpeg).with_asset_id("a1");
        let ts = extractor.extract_timestamp(&mut media).await.unwrap();

        assert_eq!(ts.source, TimestampSource::EmbeddedCapture);
        assert_eq!(ts.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap());
        // Asset store is never consulted once an embedded field is found
        assert!(store.lookups.lock().unwrap().is_empty());
        // Read-only
        assert_eq!(media.capture_timestamp(), None);
    }

    #[tokio::test]
    async fn test_modified_field_when_capture_missing() {
        let jpeg = jpeg_with_exif(&[(DATE_TIME, "2024:06:02 12:00:00")], &[]);
        let extractor = MetadataExtractor::default();

        let mut media = MediaSelection::image(jpeg);
        let ts = extractor.extract_timestamp(&mut media).await.unwrap();
        assert_eq!(ts.source, TimestampSource::EmbeddedModified);
    }

    #[tokio::test]
    async fn test_asset_store_creation_time() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let store = store_with(
            "a1",
            AssetRecord {
                created_at: Some(created),
                modified_at: Some(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()),
            },
        );
        let extractor = MetadataExtractor::new(Some(store), None);

        let mut media = MediaSelection::image(vec![0u8; 32]).with_asset_id("a1");
        let resolved = extractor.resolve_timestamp(&mut media).await;

        assert_eq!(resolved.timestamp, created);
        assert_eq!(resolved.source, TimestampSource::AssetCreated);
        assert_eq!(media.capture_timestamp(), Some(created));
        assert!(media.timestamp_resolved());
    }

    #[tokio::test]
    async fn test_asset_store_modification_time() {
        let modified = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let store = store_with(
            "a1",
            AssetRecord {
                created_at: None,
                modified_at: Some(modified),
            },
        );
        let extractor = MetadataExtractor::new(Some(store), None);

        let mut media = MediaSelection::image(vec![0u8; 32]).with_asset_id("a1");
        let ts = extractor.extract_timestamp(&mut media).await.unwrap();
        assert_eq!(ts, ExtractedTimestamp::new(modified, TimestampSource::AssetModified));
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_now() {
        let store = Arc::new(MockAssetStore {
            fail: true,
            ..Default::default()
        });
        let extractor = MetadataExtractor::new(Some(store.clone()), None);

        let before = Utc::now();
        let mut media = MediaSelection::image(vec![0u8; 32]).with_asset_id("a1");
        assert_eq!(extractor.extract_timestamp(&mut media).await, None);

        let resolved = extractor.resolve_timestamp(&mut media).await;
        assert_eq!(resolved.source, TimestampSource::OperatorSupplied);
        assert!(resolved.timestamp >= before);
        assert!(!media.timestamp_resolved());
        assert_eq!(store.lookups.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_video_without_probe_uses_asset_store() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let store = store_with(
            "clip",
            AssetRecord {
                created_at: Some(created),
                modified_at: None,
            },
        );
        let extractor = MetadataExtractor::new(Some(store), None);

        let mut media = MediaSelection::video(vec![0u8; 32]).with_asset_id("clip");
        let ts = extractor.extract_timestamp(&mut media).await.unwrap();
        assert_eq!(ts.source, TimestampSource::AssetCreated);
        assert!(!media.has_staged_file());
    }
}
