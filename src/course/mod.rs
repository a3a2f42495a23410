pub mod repository;

pub use repository::CourseRepository;
