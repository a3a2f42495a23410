use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::course::{Block, BlockType, VideoQuality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadedState {
    Waiting,
    Downloading,
    Downloaded,
    NotDownloaded,
}

impl DownloadedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadedState::Waiting => "waiting",
            DownloadedState::Downloading => "downloading",
            DownloadedState::Downloaded => "downloaded",
            DownloadedState::NotDownloaded => "not_downloaded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "waiting" => DownloadedState::Waiting,
            "downloading" => DownloadedState::Downloading,
            "downloaded" => DownloadedState::Downloaded,
            _ => DownloadedState::NotDownloaded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Video,
    /// Zipped offline package of a non-video block
    XBlock,
    Others,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Video => "video",
            FileType::XBlock => "x_block",
            FileType::Others => "others",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "video" => FileType::Video,
            "x_block" => FileType::XBlock,
            _ => FileType::Others,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            FileType::Video => "mp4",
            FileType::XBlock => "zip",
            FileType::Others => "bin",
        }
    }
}

/// A queued or finished download of a single block's media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadModel {
    /// Block id the media belongs to
    pub id: String,
    pub course_id: String,
    pub title: String,
    /// Expected size before download, bytes on disk after
    pub size: u64,
    pub path: PathBuf,
    pub url: String,
    pub file_type: FileType,
    pub state: DownloadedState,
    pub last_modified: Option<DateTime<Utc>>,
}

impl DownloadModel {
    /// Build a waiting download for `block`, or `None` when it has nothing to save.
    ///
    /// Videos use the encoding picked for `quality`. Other leaves are saved
    /// only when the server publishes an offline package for them.
    pub fn for_block(
        course_id: &str,
        block: &Block,
        download_dir: &Path,
        quality: VideoQuality,
    ) -> Option<Self> {
        let (url, size, file_type, last_modified) = match block.block_type {
            BlockType::Video => {
                let video = block.downloadable_video(quality)?;
                (video.url.clone(), video.file_size, FileType::Video, None)
            }
            t if t.is_container() => return None,
            _ => {
                let package = block.offline_package()?;
                (
                    package.file_url.clone(),
                    package.file_size,
                    FileType::XBlock,
                    package.last_modified,
                )
            }
        };

        let path = download_dir.join(Self::file_name(&url, file_type));

        Some(Self {
            id: block.id.clone(),
            course_id: course_id.to_string(),
            title: block.display_title().to_string(),
            size,
            path,
            url,
            file_type,
            state: DownloadedState::Waiting,
            last_modified,
        })
    }

    /// Deterministic file name derived from the media URL.
    pub fn file_name(url: &str, file_type: FileType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        format!("{}.{}", hex::encode(hasher.finalize()), file_type.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::course::{EncodedVideos, OfflineDownload, StudentViewData, VideoInfo};

    fn video_block() -> Block {
        Block {
            id: "block-v1:edX+Demo+type@video+block@intro".into(),
            block_id: "intro".into(),
            lms_web_url: String::new(),
            student_view_url: String::new(),
            block_type: BlockType::Video,
            display_name: "Intro video".into(),
            graded: false,
            descendants: vec![],
            descendants_type: BlockType::Video,
            completion: 0.0,
            contains_gated_content: false,
            student_view_data: Some(StudentViewData {
                encoded_videos: Some(EncodedVideos {
                    desktop_mp4: Some(VideoInfo {
                        url: "https://cdn.example.com/intro.mp4".into(),
                        file_size: 2048,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            video_count: 1,
            offline_download: None,
        }
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            DownloadedState::Waiting,
            DownloadedState::Downloading,
            DownloadedState::Downloaded,
            DownloadedState::NotDownloaded,
        ] {
            assert_eq!(DownloadedState::parse(state.as_str()), state);
        }
        assert_eq!(DownloadedState::parse("bogus"), DownloadedState::NotDownloaded);
    }

    #[test]
    fn test_file_name_is_deterministic_hex() {
        let a = DownloadModel::file_name("https://cdn.example.com/a.mp4", FileType::Video);
        let b = DownloadModel::file_name("https://cdn.example.com/a.mp4", FileType::Video);
        let c = DownloadModel::file_name("https://cdn.example.com/b.mp4", FileType::Video);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".mp4"));
        assert_eq!(a.len(), 64 + 4);
    }

    #[test]
    fn test_for_block_video() {
        let dir = Path::new("/tmp/courseware");
        let model =
            DownloadModel::for_block("course-v1:edX+Demo", &video_block(), dir, VideoQuality::Auto)
                .unwrap();
        assert_eq!(model.url, "https://cdn.example.com/intro.mp4");
        assert_eq!(model.size, 2048);
        assert_eq!(model.file_type, FileType::Video);
        assert_eq!(model.state, DownloadedState::Waiting);
        assert!(model.path.starts_with(dir));
    }

    #[test]
    fn test_for_block_without_media() {
        let mut block = video_block();
        block.student_view_data = None;
        let dir = Path::new("/tmp");
        assert!(DownloadModel::for_block("c", &block, dir, VideoQuality::Auto).is_none());

        block.block_type = BlockType::Problem;
        assert!(DownloadModel::for_block("c", &block, dir, VideoQuality::Auto).is_none());

        // A page without an offline package is not fetched from the LMS.
        block.block_type = BlockType::Html;
        block.student_view_url = "https://lms.example.com/xblock/html".into();
        assert!(DownloadModel::for_block("c", &block, dir, VideoQuality::Auto).is_none());
    }

    #[test]
    fn test_for_block_offline_package() {
        let mut block = video_block();
        block.block_type = BlockType::Html;
        block.student_view_data = None;
        block.offline_download = Some(OfflineDownload {
            file_url: "https://lms.example.com/media/offline/page.zip".into(),
            file_size: 4096,
            last_modified: None,
        });

        let model =
            DownloadModel::for_block("c", &block, Path::new("/tmp"), VideoQuality::Auto).unwrap();
        assert_eq!(model.url, "https://lms.example.com/media/offline/page.zip");
        assert_eq!(model.size, 4096);
        assert_eq!(model.file_type, FileType::XBlock);
        assert!(model.path.to_string_lossy().ends_with(".zip"));

        block.block_type = BlockType::Vertical;
        let dir = Path::new("/tmp");
        assert!(DownloadModel::for_block("c", &block, dir, VideoQuality::Auto).is_none());
    }
}
