//! # Courseware
//!
//! A terminal-first, offline-capable client for Open edX style learning
//! platforms.
//!
//! ## Architecture
//!
//! ```text
//! CLI → AppContext → ApiClient → LMS
//!                        └→ Authenticator (401 → refresh → retry once)
//!          ├→ CourseRepository → Connectivity + Store (SQLite cache)
//!          └→ DownloadWorker → FileDownloader → disk
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Sign in
//! courseware login staff@example.com
//!
//! # List enrolled courses
//! courseware courses
//!
//! # Show a course's block tree, offline from the cache
//! courseware --offline structure course-v1:edX+DemoX+Demo_Course
//!
//! # Queue and download a unit's videos
//! courseware download add course-v1:edX+DemoX+Demo_Course <block-id>
//! courseware download run
//! ```

/// Application context, events and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, session, API client, repository, downloader.
pub mod app;

/// Session state, sign-in and the refresh-token authenticator.
pub mod auth;

/// LMS REST API: wire models, the OAuth client and the authorized client.
pub mod api;

/// Configuration loaded from `~/.config/courseware/config.toml`.
pub mod config;

/// Command-line interface using clap.
pub mod cli;

/// Online/offline detection.
pub mod connectivity;

/// Course data with cache fallback.
pub mod course;

/// Core domain models.
///
/// - [`CourseStructure`](domain::CourseStructure) and [`Block`](domain::Block)
/// - [`EnrolledCourse`](domain::EnrolledCourse)
/// - [`DownloadModel`](domain::DownloadModel) with SHA256 file names
/// - [`TokenPair`](domain::TokenPair) and [`User`](domain::User)
pub mod domain;

/// Download queue, worker and streaming file downloader.
pub mod download;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
