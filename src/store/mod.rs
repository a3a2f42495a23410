pub mod sqlite;

use crate::app::Result;
use crate::domain::{
    CourseStructure, DownloadModel, DownloadedState, EnrolledCourse, TokenPair, User,
};

pub use sqlite::SqliteStore;

pub trait Store {
    // Session operations
    fn load_tokens(&self) -> Result<Option<TokenPair>>;
    fn save_tokens(&self, tokens: &TokenPair) -> Result<()>;
    fn load_user(&self) -> Result<Option<User>>;
    fn save_user(&self, user: &User) -> Result<()>;
    fn clear_session(&self) -> Result<()>;

    // Course cache operations
    fn get_course_structure(&self, course_id: &str) -> Result<Option<CourseStructure>>;
    fn save_course_structure(&self, structure: &CourseStructure) -> Result<()>;
    fn get_enrolled_courses(&self, username: &str) -> Result<Vec<EnrolledCourse>>;
    fn replace_enrolled_courses(&self, username: &str, courses: &[EnrolledCourse]) -> Result<()>;

    // Download operations
    fn add_downloads(&self, downloads: &[DownloadModel]) -> Result<usize>;
    fn get_download(&self, id: &str) -> Result<Option<DownloadModel>>;
    fn get_all_downloads(&self) -> Result<Vec<DownloadModel>>;
    fn get_downloads_by_state(&self, state: DownloadedState) -> Result<Vec<DownloadModel>>;
    fn update_download(&self, download: &DownloadModel) -> Result<()>;
    fn remove_download(&self, id: &str) -> Result<()>;
}
