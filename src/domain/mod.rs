pub mod course;
pub mod download;
pub mod session;

pub use course::{
    Block, BlockType, CourseStatus, CourseStructure, EncodedVideos, EnrolledCourse,
    OfflineDownload, StudentViewData, VideoInfo, VideoQuality,
};
pub use download::{DownloadModel, DownloadedState, FileType};
pub use session::{TokenPair, User};
