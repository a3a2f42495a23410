//! Wire formats of the LMS REST API and their mapping to domain types.
//!
//! Every field is optional on the wire; defaults are applied here so the
//! domain never sees a missing value.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Block, BlockType, CourseStatus, CourseStructure, EncodedVideos, EnrolledCourse,
    OfflineDownload, StudentViewData, TokenPair, User, VideoInfo,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl AuthResponse {
    /// Both tokens, when the server issued a complete pair.
    pub fn token_pair(&self) -> Option<TokenPair> {
        match (self.access_token.as_deref(), self.refresh_token.as_deref()) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(TokenPair::new(access, refresh))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserDto {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl UserDto {
    pub fn into_domain(self) -> User {
        User {
            id: self.id.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfoDto {
    pub url: Option<String>,
    pub file_size: Option<u64>,
}

impl VideoInfoDto {
    fn into_domain(self) -> VideoInfo {
        VideoInfo {
            url: self.url.unwrap_or_default(),
            file_size: self.file_size.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodedVideosDto {
    pub youtube: Option<VideoInfoDto>,
    pub hls: Option<VideoInfoDto>,
    pub fallback: Option<VideoInfoDto>,
    pub desktop_mp4: Option<VideoInfoDto>,
    pub mobile_high: Option<VideoInfoDto>,
    pub mobile_low: Option<VideoInfoDto>,
}

impl EncodedVideosDto {
    fn into_domain(self) -> EncodedVideos {
        EncodedVideos {
            youtube: self.youtube.map(VideoInfoDto::into_domain),
            hls: self.hls.map(VideoInfoDto::into_domain),
            fallback: self.fallback.map(VideoInfoDto::into_domain),
            desktop_mp4: self.desktop_mp4.map(VideoInfoDto::into_domain),
            mobile_high: self.mobile_high.map(VideoInfoDto::into_domain),
            mobile_low: self.mobile_low.map(VideoInfoDto::into_domain),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentViewDataDto {
    pub only_on_web: Option<bool>,
    /// Seconds as a number, or a free-form string on older servers.
    pub duration: Option<serde_json::Value>,
    pub encoded_videos: Option<EncodedVideosDto>,
    pub topic_id: Option<String>,
    /// Some servers nest the offline package here instead of on the block.
    pub offline_download: Option<OfflineDownloadDto>,
}

impl StudentViewDataDto {
    fn into_domain(self) -> StudentViewData {
        let duration = match self.duration {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        StudentViewData {
            only_on_web: self.only_on_web.unwrap_or(false),
            duration,
            encoded_videos: self.encoded_videos.map(EncodedVideosDto::into_domain),
            topic_id: self.topic_id.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineDownloadDto {
    pub file_url: Option<String>,
    pub file_size: Option<u64>,
    pub last_modified: Option<String>,
}

impl OfflineDownloadDto {
    fn into_domain(self) -> OfflineDownload {
        OfflineDownload {
            file_url: self.file_url.unwrap_or_default(),
            file_size: self.file_size.unwrap_or_default(),
            last_modified: self.last_modified.as_deref().and_then(parse_iso8601),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockCountsDto {
    pub video: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockDto {
    pub id: Option<String>,
    pub block_id: Option<String>,
    pub lms_web_url: Option<String>,
    pub student_view_url: Option<String>,
    #[serde(rename = "type")]
    pub block_type: Option<String>,
    pub display_name: Option<String>,
    pub graded: Option<bool>,
    pub descendants: Option<Vec<String>>,
    pub student_view_data: Option<StudentViewDataDto>,
    pub block_counts: Option<BlockCountsDto>,
    pub completion: Option<f64>,
    pub contains_gated_content: Option<bool>,
    pub offline_download: Option<OfflineDownloadDto>,
}

impl BlockDto {
    fn parsed_type(&self) -> BlockType {
        BlockType::parse(self.block_type.as_deref().unwrap_or(""))
    }

    /// Map to the domain, resolving a vertical's summary type from its children.
    pub fn into_domain(self, all: &HashMap<String, BlockDto>) -> Block {
        let block_type = self.parsed_type();
        let descendants = self.descendants.unwrap_or_default();

        let descendants_type = if block_type == BlockType::Vertical {
            let mut types: Vec<BlockType> = descendants
                .iter()
                .map(|id| all.get(id).map(BlockDto::parsed_type).unwrap_or(BlockType::Others))
                .collect();
            BlockType::sort_by_priority(&mut types);
            types.first().copied().unwrap_or(block_type)
        } else {
            block_type
        };

        let mut student_view_data = self.student_view_data;
        let offline_download = self
            .offline_download
            .or_else(|| {
                student_view_data
                    .as_mut()
                    .and_then(|d| d.offline_download.take())
            })
            .map(OfflineDownloadDto::into_domain);

        Block {
            id: self.id.unwrap_or_default(),
            block_id: self.block_id.unwrap_or_default(),
            lms_web_url: self.lms_web_url.unwrap_or_default(),
            student_view_url: self.student_view_url.unwrap_or_default(),
            block_type,
            display_name: self
                .display_name
                .map(|n| decode_html_entities(&n).to_string())
                .unwrap_or_default(),
            graded: self.graded.unwrap_or(false),
            descendants,
            descendants_type,
            completion: self.completion.unwrap_or(0.0),
            contains_gated_content: self.contains_gated_content.unwrap_or(false),
            student_view_data: student_view_data.map(StudentViewDataDto::into_domain),
            video_count: self.block_counts.and_then(|c| c.video).unwrap_or(0),
            offline_download,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageDto {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaDto {
    pub course_image: Option<ImageDto>,
    pub image: Option<HashMap<String, String>>,
}

impl MediaDto {
    fn image_url(self) -> String {
        self.course_image
            .and_then(|i| i.uri)
            .or_else(|| self.image.and_then(|mut m| m.remove("large")))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseStructureDto {
    pub root: String,
    pub blocks: HashMap<String, BlockDto>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
    pub org: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub is_self_paced: Option<bool>,
    pub media: Option<MediaDto>,
}

impl CourseStructureDto {
    /// Map to the domain. `course_id` fills in when the server omits `id`.
    pub fn into_domain(self, course_id: &str) -> CourseStructure {
        let mut ids: Vec<&String> = self.blocks.keys().collect();
        ids.sort();
        let blocks = ids
            .into_iter()
            .filter_map(|id| self.blocks.get(id))
            .map(|b| b.clone().into_domain(&self.blocks))
            .collect();

        CourseStructure {
            root: self.root,
            blocks,
            id: self.id.filter(|s| !s.is_empty()).unwrap_or_else(|| course_id.to_string()),
            name: self.name.map(|n| decode_html_entities(&n).to_string()).unwrap_or_default(),
            number: self.number.unwrap_or_default(),
            org: self.org.unwrap_or_default(),
            start: self.start.as_deref().and_then(parse_iso8601),
            end: self.end.as_deref().and_then(parse_iso8601),
            is_self_paced: self.is_self_paced.unwrap_or(false),
            course_image: self.media.map(MediaDto::image_url).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrolledCourseDataDto {
    pub id: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
    pub org: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub course_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrolledCourseDto {
    pub mode: Option<String>,
    pub is_active: Option<bool>,
    pub course: Option<EnrolledCourseDataDto>,
}

impl EnrolledCourseDto {
    /// Enrollments without course data are dropped.
    pub fn into_domain(self) -> Option<EnrolledCourse> {
        let course = self.course?;
        Some(EnrolledCourse {
            course_id: course.id.unwrap_or_default(),
            name: course
                .name
                .map(|n| decode_html_entities(&n).to_string())
                .unwrap_or_default(),
            org: course.org.unwrap_or_default(),
            number: course.number.unwrap_or_default(),
            mode: self.mode.unwrap_or_default(),
            is_active: self.is_active.unwrap_or(false),
            start: course.start.as_deref().and_then(parse_iso8601),
            end: course.end.as_deref().and_then(parse_iso8601),
            course_image: course.course_image.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentPageDto {
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<EnrolledCourseDto>,
}

/// `course_enrollments` answers either with a bare list (old servers) or a
/// paged object under `enrollments`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CourseEnrollmentsDto {
    Paged { enrollments: EnrollmentPageDto },
    List(Vec<EnrolledCourseDto>),
}

impl CourseEnrollmentsDto {
    pub fn into_parts(self) -> (Vec<EnrolledCourse>, Option<String>) {
        let (results, next) = match self {
            CourseEnrollmentsDto::Paged { enrollments } => (enrollments.results, enrollments.next),
            CourseEnrollmentsDto::List(results) => (results, None),
        };
        (
            results
                .into_iter()
                .filter_map(EnrolledCourseDto::into_domain)
                .collect(),
            next,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseStatusDto {
    pub last_visited_block_id: Option<String>,
    pub last_visited_module_path: Option<Vec<String>>,
}

impl CourseStatusDto {
    pub fn into_domain(self) -> CourseStatus {
        CourseStatus {
            last_visited_block_id: self.last_visited_block_id.unwrap_or_default(),
            last_visited_module_path: self.last_visited_module_path.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlocksCompletionBody {
    pub username: String,
    pub course_key: String,
    pub blocks: HashMap<String, f64>,
}

impl BlocksCompletionBody {
    pub fn new(username: &str, course_id: &str, block_ids: &[String]) -> Self {
        Self {
            username: username.to_string(),
            course_key: course_id.to_string(),
            blocks: block_ids.iter().map(|id| (id.clone(), 1.0)).collect(),
        }
    }
}

pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| s.parse::<DateTime<Utc>>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCTURE_SAMPLE: &str = r#"{
        "root": "block-v1:edX+DemoX+type@course+block@course",
        "blocks": {
            "block-v1:edX+DemoX+type@course+block@course": {
                "id": "block-v1:edX+DemoX+type@course+block@course",
                "block_id": "course",
                "type": "course",
                "display_name": "Demo &amp; Friends",
                "descendants": ["block-v1:edX+DemoX+type@vertical+block@unit"]
            },
            "block-v1:edX+DemoX+type@vertical+block@unit": {
                "id": "block-v1:edX+DemoX+type@vertical+block@unit",
                "block_id": "unit",
                "type": "vertical",
                "display_name": "Unit",
                "descendants": [
                    "block-v1:edX+DemoX+type@html+block@text",
                    "block-v1:edX+DemoX+type@video+block@vid"
                ],
                "completion": 0.5
            },
            "block-v1:edX+DemoX+type@html+block@text": {
                "id": "block-v1:edX+DemoX+type@html+block@text",
                "block_id": "text",
                "type": "html",
                "student_view_data": {
                    "offline_download": {
                        "file_url": "https://lms.example.com/media/offline/text.zip",
                        "file_size": 4096,
                        "last_modified": "2024-03-01T10:00:00Z"
                    }
                }
            },
            "block-v1:edX+DemoX+type@video+block@vid": {
                "id": "block-v1:edX+DemoX+type@video+block@vid",
                "block_id": "vid",
                "type": "video",
                "block_counts": {"video": 1},
                "student_view_data": {
                    "only_on_web": false,
                    "duration": 125.5,
                    "encoded_videos": {
                        "mobile_low": {"url": "https://cdn.example.com/low.mp4", "file_size": 1000}
                    }
                }
            }
        },
        "id": "course-v1:edX+DemoX+Demo_Course",
        "name": "Demonstration Course",
        "number": "DemoX",
        "org": "edX",
        "start": "2013-02-05T05:00:00Z",
        "end": null,
        "is_self_paced": true
    }"#;

    #[test]
    fn test_structure_mapping() {
        let dto: CourseStructureDto = serde_json::from_str(STRUCTURE_SAMPLE).unwrap();
        let structure = dto.into_domain("ignored");

        assert_eq!(structure.id, "course-v1:edX+DemoX+Demo_Course");
        assert_eq!(structure.blocks.len(), 4);
        assert!(structure.start.is_some());
        assert!(structure.end.is_none());
        assert!(structure.is_self_paced);

        let root = structure.root_block().unwrap();
        assert_eq!(root.display_name, "Demo & Friends");
    }

    #[test]
    fn test_vertical_descendants_type_prefers_video_over_html() {
        let dto: CourseStructureDto = serde_json::from_str(STRUCTURE_SAMPLE).unwrap();
        let structure = dto.into_domain("c");
        let unit = structure.block("block-v1:edX+DemoX+type@vertical+block@unit").unwrap();

        assert_eq!(unit.block_type, BlockType::Vertical);
        assert_eq!(unit.descendants_type, BlockType::Video);
        assert_eq!(unit.completion, 0.5);
    }

    #[test]
    fn test_offline_download_mapping() {
        let dto: CourseStructureDto = serde_json::from_str(STRUCTURE_SAMPLE).unwrap();
        let structure = dto.into_domain("c");
        let text = structure.block("block-v1:edX+DemoX+type@html+block@text").unwrap();

        let package = text.offline_download.as_ref().unwrap();
        assert_eq!(package.file_url, "https://lms.example.com/media/offline/text.zip");
        assert_eq!(package.file_size, 4096);
        assert!(package.last_modified.is_some());

        let vid = structure.block("block-v1:edX+DemoX+type@video+block@vid").unwrap();
        assert!(vid.offline_download.is_none());
    }

    #[test]
    fn test_block_level_offline_download_wins() {
        let dto: BlockDto = serde_json::from_str(
            r#"{
                "id": "b",
                "type": "problem",
                "offline_download": {"file_url": "https://lms.example.com/top.zip"},
                "student_view_data": {
                    "offline_download": {"file_url": "https://lms.example.com/nested.zip"}
                }
            }"#,
        )
        .unwrap();

        let block = dto.into_domain(&HashMap::new());
        let package = block.offline_download.unwrap();
        assert_eq!(package.file_url, "https://lms.example.com/top.zip");
        assert_eq!(package.file_size, 0);
        assert!(package.last_modified.is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let dto: CourseStructureDto = serde_json::from_str(STRUCTURE_SAMPLE).unwrap();
        let structure = dto.into_domain("c");
        let text = structure.block("block-v1:edX+DemoX+type@html+block@text").unwrap();

        assert_eq!(text.display_name, "");
        assert_eq!(text.display_title(), "text");
        assert!(!text.graded);
        assert!(text.descendants.is_empty());
        assert_eq!(text.video_count, 0);

        let vid = structure.block("block-v1:edX+DemoX+type@video+block@vid").unwrap();
        assert_eq!(vid.student_view_data.as_ref().unwrap().duration, "125.5");
        assert_eq!(vid.video_count, 1);
    }

    #[test]
    fn test_structure_id_falls_back_to_requested_course() {
        let dto: CourseStructureDto =
            serde_json::from_str(r#"{"root": "r", "blocks": {}}"#).unwrap();
        assert_eq!(dto.into_domain("course-v1:x").id, "course-v1:x");
    }

    #[test]
    fn test_enrollments_paged_and_list() {
        let paged = r#"{"enrollments": {"next": null, "results": [
            {"mode": "audit", "is_active": true, "course": {"id": "c1", "name": "One"}},
            {"mode": "audit", "is_active": true, "course": null}
        ]}}"#;
        let (courses, next) = serde_json::from_str::<CourseEnrollmentsDto>(paged)
            .unwrap()
            .into_parts();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].course_id, "c1");
        assert!(next.is_none());

        let list = r#"[{"mode": "verified", "course": {"id": "c2"}}]"#;
        let (courses, _) = serde_json::from_str::<CourseEnrollmentsDto>(list)
            .unwrap()
            .into_parts();
        assert_eq!(courses[0].mode, "verified");
        assert!(!courses[0].is_active);
    }

    #[test]
    fn test_token_pair_requires_both_tokens() {
        let full = AuthResponse {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
            ..Default::default()
        };
        assert_eq!(full.token_pair(), Some(TokenPair::new("a", "r")));

        let partial = AuthResponse {
            access_token: Some("a".into()),
            refresh_token: Some(String::new()),
            ..Default::default()
        };
        assert!(partial.token_pair().is_none());
    }

    #[test]
    fn test_completion_body_marks_each_block() {
        let body = BlocksCompletionBody::new("staff", "course-1", &["a".into(), "b".into()]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["course_key"], "course-1");
        assert_eq!(json["blocks"]["a"], 1.0);
        assert_eq!(json["blocks"]["b"], 1.0);
    }
}
