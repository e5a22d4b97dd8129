use serde_json::Value;

pub trait FromStream {
    fn from_stream(stream_data: &Value) -> Option<Self>
    where
        Self: Sized;
}

/// Primary video stream as reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStream {
    pub width: u32,
    pub height: u32,
}

impl VideoStream {
    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }

    pub fn shorter_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

impl FromStream for VideoStream {
    fn from_stream(stream_data: &Value) -> Option<Self> {
        // `codec_type` is absent when ffprobe is asked for width/height only.
        if let Some(codec_type) = stream_data.get("codec_type").and_then(|v| v.as_str()) {
            if codec_type != "video" {
                return None;
            }
        }

        let width = stream_data.get("width")?.as_u64()?;
        let height = stream_data.get("height")?.as_u64()?;

        Some(VideoStream {
            width: u32::try_from(width).ok()?,
            height: u32::try_from(height).ok()?,
        })
    }
}

/// First video stream in a `{"streams": [...]}` ffprobe document.
pub fn first_video_stream(document: &Value) -> Option<VideoStream> {
    document
        .get("streams")?
        .as_array()?
        .iter()
        .find_map(VideoStream::from_stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_stream_valid_video() {
        let stream_data = json!({
            "codec_type": "video",
            "width": 1920,
            "height": 1080
        });
        let stream = VideoStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.width, 1920);
        assert_eq!(stream.height, 1080);
        assert!(stream.is_landscape());
        assert_eq!(stream.shorter_side(), 1080);
    }

    #[test]
    fn test_from_stream_vertical_video() {
        let stream_data = json!({ "codec_type": "video", "width": 1080, "height": 1920 });
        let stream = VideoStream::from_stream(&stream_data).unwrap();
        assert!(!stream.is_landscape());
    }

    #[test]
    fn test_from_stream_non_video_codec_type() {
        let stream_data = json!({ "codec_type": "audio", "codec_name": "aac" });
        assert!(VideoStream::from_stream(&stream_data).is_none());
    }

    #[test]
    fn test_from_stream_without_codec_type() {
        let stream_data = json!({ "width": 1280, "height": 720 });
        assert_eq!(
            VideoStream::from_stream(&stream_data),
            Some(VideoStream { width: 1280, height: 720 })
        );
    }

    #[test]
    fn test_from_stream_width_height_not_numbers() {
        let stream_data = json!({ "codec_type": "video", "width": "wide", "height": 1080 });
        assert!(VideoStream::from_stream(&stream_data).is_none());

        let stream_data = json!({ "codec_type": "video", "width": 1920, "height": null });
        assert!(VideoStream::from_stream(&stream_data).is_none());
    }

    #[test]
    fn test_first_video_stream_skips_audio() {
        let document = json!({
            "streams": [
                { "codec_type": "audio" },
                { "codec_type": "video", "width": 640, "height": 360 }
            ]
        });
        assert_eq!(
            first_video_stream(&document),
            Some(VideoStream { width: 640, height: 360 })
        );
        assert_eq!(first_video_stream(&json!({ "streams": [] })), None);
        assert_eq!(first_video_stream(&json!({})), None);
    }
}
