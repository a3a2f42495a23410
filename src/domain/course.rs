use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Chapter,
    Course,
    Discussion,
    DragAndDropV2,
    Html,
    LtiConsumer,
    Openassessment,
    Others,
    Problem,
    Section,
    Sequential,
    Vertical,
    Video,
    WordCloud,
    Survey,
}

impl BlockType {
    /// Parse the `type` field of a block. Dashes are treated as underscores
    /// and anything unrecognised maps to [`BlockType::Others`].
    pub fn parse(raw: &str) -> Self {
        match raw.replace('-', "_").to_lowercase().as_str() {
            "chapter" => BlockType::Chapter,
            "course" => BlockType::Course,
            "discussion" => BlockType::Discussion,
            "drag_and_drop_v2" => BlockType::DragAndDropV2,
            "html" => BlockType::Html,
            "lti_consumer" => BlockType::LtiConsumer,
            "openassessment" => BlockType::Openassessment,
            "problem" => BlockType::Problem,
            "section" => BlockType::Section,
            "sequential" => BlockType::Sequential,
            "vertical" => BlockType::Vertical,
            "video" => BlockType::Video,
            "word_cloud" => BlockType::WordCloud,
            "survey" => BlockType::Survey,
            _ => BlockType::Others,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Chapter => "chapter",
            BlockType::Course => "course",
            BlockType::Discussion => "discussion",
            BlockType::DragAndDropV2 => "drag_and_drop_v2",
            BlockType::Html => "html",
            BlockType::LtiConsumer => "lti_consumer",
            BlockType::Openassessment => "openassessment",
            BlockType::Others => "others",
            BlockType::Problem => "problem",
            BlockType::Section => "section",
            BlockType::Sequential => "sequential",
            BlockType::Vertical => "vertical",
            BlockType::Video => "video",
            BlockType::WordCloud => "word_cloud",
            BlockType::Survey => "survey",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockType::Chapter
                | BlockType::Course
                | BlockType::Section
                | BlockType::Sequential
                | BlockType::Vertical
        )
    }

    /// Lower is more important when summarising a vertical's content.
    fn priority(&self) -> u32 {
        match self {
            BlockType::Problem => 1,
            BlockType::Video => 2,
            BlockType::Discussion => 3,
            BlockType::Html => 4,
            _ => u32::MAX,
        }
    }

    /// Stable sort by display priority: problem, video, discussion, html, rest.
    pub fn sort_by_priority(types: &mut [BlockType]) {
        types.sort_by_key(|t| t.priority());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub url: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodedVideos {
    pub youtube: Option<VideoInfo>,
    pub hls: Option<VideoInfo>,
    pub fallback: Option<VideoInfo>,
    pub desktop_mp4: Option<VideoInfo>,
    pub mobile_high: Option<VideoInfo>,
    pub mobile_low: Option<VideoInfo>,
}

/// Which encoding to save when downloading a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoQuality {
    /// Smallest available encoding
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "360p")]
    Low,
    #[serde(rename = "540p")]
    Medium,
    #[serde(rename = "720p")]
    High,
}

impl EncodedVideos {
    /// The encoding to download for `quality`.
    ///
    /// An encoding that exists for the requested quality is used or nothing
    /// is. Otherwise the first of mobile_low, mobile_high, desktop_mp4 and
    /// then a non-HLS fallback wins. YouTube and HLS are never downloadable.
    pub fn downloadable(&self, quality: VideoQuality) -> Option<&VideoInfo> {
        let preferred = match quality {
            VideoQuality::Auto => None,
            VideoQuality::Low => self.mobile_low.as_ref(),
            VideoQuality::Medium => self.mobile_high.as_ref(),
            VideoQuality::High => self.desktop_mp4.as_ref(),
        };
        if let Some(video) = preferred {
            return is_downloadable(&video.url).then_some(video);
        }

        [&self.mobile_low, &self.mobile_high, &self.desktop_mp4, &self.fallback]
            .into_iter()
            .flatten()
            .find(|v| is_downloadable(&v.url))
    }
}

fn is_downloadable(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    (url.starts_with("http://") || url.starts_with("https://"))
        && !url.contains("youtube.com")
        && !url.contains("youtu.be")
        && !path.ends_with(".m3u8")
}

/// A packaged offline copy of a non-video block, served as a zip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineDownload {
    pub file_url: String,
    pub file_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentViewData {
    pub only_on_web: bool,
    pub duration: String,
    pub encoded_videos: Option<EncodedVideos>,
    pub topic_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub block_id: String,
    pub lms_web_url: String,
    pub student_view_url: String,
    pub block_type: BlockType,
    pub display_name: String,
    pub graded: bool,
    pub descendants: Vec<String>,
    pub descendants_type: BlockType,
    pub completion: f64,
    pub contains_gated_content: bool,
    pub student_view_data: Option<StudentViewData>,
    pub video_count: u32,
    pub offline_download: Option<OfflineDownload>,
}

impl Block {
    pub fn is_completed(&self) -> bool {
        self.completion >= 1.0
    }

    pub fn display_title(&self) -> &str {
        if self.display_name.is_empty() {
            &self.block_id
        } else {
            &self.display_name
        }
    }

    pub fn downloadable_video(&self, quality: VideoQuality) -> Option<&VideoInfo> {
        self.student_view_data
            .as_ref()
            .filter(|d| !d.only_on_web)
            .and_then(|d| d.encoded_videos.as_ref())
            .and_then(|v| v.downloadable(quality))
    }

    /// The packaged offline copy, when the server offers one.
    pub fn offline_package(&self) -> Option<&OfflineDownload> {
        self.offline_download
            .as_ref()
            .filter(|d| is_downloadable(&d.file_url))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStructure {
    pub root: String,
    pub blocks: Vec<Block>,
    pub id: String,
    pub name: String,
    pub number: String,
    pub org: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub is_self_paced: bool,
    pub course_image: String,
}

impl CourseStructure {
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id || b.block_id == id)
    }

    /// Direct children of `block`, in the order the course defines them.
    pub fn children(&self, block: &Block) -> Vec<&Block> {
        block
            .descendants
            .iter()
            .filter_map(|id| self.block(id))
            .collect()
    }

    pub fn root_block(&self) -> Option<&Block> {
        self.block(&self.root)
    }

    /// Walk the tree depth-first from the root, yielding `(depth, block)`.
    pub fn walk(&self) -> Vec<(usize, &Block)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &Block)> =
            self.root_block().map(|b| (0, b)).into_iter().collect();

        while let Some((depth, block)) = stack.pop() {
            out.push((depth, block));
            for child in self.children(block).into_iter().rev() {
                // Guard against malformed trees referencing an ancestor.
                if out.iter().all(|(_, b)| b.id != child.id) {
                    stack.push((depth + 1, child));
                }
            }
        }

        out
    }

    /// All leaf blocks under `block_id` (inclusive).
    pub fn leaves_under(&self, block_id: &str) -> Vec<&Block> {
        let Some(start) = self.block(block_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack = vec![start];
        let mut seen = std::collections::HashSet::new();

        while let Some(block) = stack.pop() {
            if !seen.insert(block.id.as_str()) {
                continue;
            }
            if block.block_type.is_container() {
                stack.extend(self.children(block).into_iter().rev());
            } else {
                out.push(block);
            }
        }

        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledCourse {
    pub course_id: String,
    pub name: String,
    pub org: String,
    pub number: String,
    pub mode: String,
    pub is_active: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub course_image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseStatus {
    pub last_visited_block_id: String,
    pub last_visited_module_path: Vec<String>,
}
