use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::LmsApi;
use crate::app::{CoursewareError, Result};
use crate::auth::Session;
use crate::connectivity::NetworkConnection;
use crate::domain::{CourseStatus, CourseStructure, EnrolledCourse};
use crate::store::Store;

/// Course data served from the network when online and from the SQLite
/// cache when not. Structures are also memoised for the process lifetime.
pub struct CourseRepository {
    api: Arc<dyn LmsApi + Send + Sync>,
    store: Arc<dyn Store + Send + Sync>,
    connection: Arc<dyn NetworkConnection + Send + Sync>,
    session: Arc<Session>,
    structures: Mutex<HashMap<String, CourseStructure>>,
}

impl CourseRepository {
    pub fn new(
        api: Arc<dyn LmsApi + Send + Sync>,
        store: Arc<dyn Store + Send + Sync>,
        connection: Arc<dyn NetworkConnection + Send + Sync>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            api,
            store,
            connection,
            session,
            structures: Mutex::new(HashMap::new()),
        }
    }

    fn memoised(&self, course_id: &str) -> Option<CourseStructure> {
        self.structures
            .lock()
            .ok()
            .and_then(|m| m.get(course_id).cloned())
    }

    fn memoise(&self, structure: &CourseStructure) {
        if let Ok(mut map) = self.structures.lock() {
            map.insert(structure.id.clone(), structure.clone());
        }
    }

    fn require_username(&self) -> Result<String> {
        self.session.username().ok_or(CoursewareError::NotSignedIn)
    }

    /// Fetch, persist and memoise a structure.
    async fn fetch_structure(&self, course_id: &str) -> Result<CourseStructure> {
        let username = self.session.username().unwrap_or_default();
        let mut structure = self.api.course_structure(&username, course_id).await?;
        // Cache rows are keyed by the id the caller asked for.
        structure.id = course_id.to_string();
        self.store.save_course_structure(&structure)?;
        self.memoise(&structure);
        info!("Fetched structure of {} ({} blocks)", course_id, structure.blocks.len());
        Ok(structure)
    }

    pub async fn get_course_structure(
        &self,
        course_id: &str,
        need_refresh: bool,
    ) -> Result<CourseStructure> {
        if !need_refresh {
            if let Some(structure) = self.memoised(course_id) {
                return Ok(structure);
            }
        }

        if self.connection.is_online().await {
            return self.fetch_structure(course_id).await;
        }

        debug!("Offline, serving cached structure of {}", course_id);
        let structure = self.get_course_structure_from_cache(course_id)?;
        self.memoise(&structure);
        Ok(structure)
    }

    pub fn get_course_structure_from_cache(&self, course_id: &str) -> Result<CourseStructure> {
        self.store
            .get_course_structure(course_id)?
            .ok_or(CoursewareError::NoCachedData)
    }

    /// Stream the known structure first, then a fresh one.
    ///
    /// The network is only asked when there is no cached copy or
    /// `force_refresh` is set. The stream ends with `NoCachedData` when it
    /// had nothing to offer.
    pub fn course_structure_updates(
        self: &Arc<Self>,
        course_id: &str,
        force_refresh: bool,
    ) -> mpsc::Receiver<Result<CourseStructure>> {
        let (tx, rx) = mpsc::channel(2);
        let repo = Arc::clone(self);
        let course_id = course_id.to_string();

        tokio::spawn(async move {
            let mut emitted = false;

            let cached = match repo.memoised(&course_id) {
                Some(structure) => Some(structure),
                None => repo.store.get_course_structure(&course_id).unwrap_or_else(|e| {
                    warn!("Failed to read cached structure of {}: {}", course_id, e);
                    None
                }),
            };
            if let Some(structure) = cached {
                emitted = true;
                if tx.send(Ok(structure)).await.is_err() {
                    return;
                }
            }

            if (!emitted || force_refresh) && repo.connection.is_online().await {
                match repo.fetch_structure(&course_id).await {
                    Ok(structure) => {
                        emitted = true;
                        if tx.send(Ok(structure)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            if !emitted {
                let _ = tx.send(Err(CoursewareError::NoCachedData)).await;
            }
        });

        rx
    }

    /// Dashboard courses. Offline serves the last fetched list.
    pub async fn get_enrolled_courses(&self) -> Result<Vec<EnrolledCourse>> {
        let username = self.require_username()?;

        if self.connection.is_online().await {
            let courses = self.api.enrolled_courses(&username).await?;
            self.store.replace_enrolled_courses(&username, &courses)?;
            return Ok(courses);
        }

        debug!("Offline, serving cached enrollments for {}", username);
        self.store.get_enrolled_courses(&username)
    }

    pub async fn mark_blocks_completion(
        &self,
        course_id: &str,
        block_ids: &[String],
    ) -> Result<()> {
        let username = self.require_username()?;
        self.api
            .mark_blocks_completion(&username, course_id, block_ids)
            .await?;
        info!("Marked {} block(s) complete in {}", block_ids.len(), course_id);
        Ok(())
    }

    pub async fn get_course_status(&self, course_id: &str) -> Result<CourseStatus> {
        let username = self.require_username()?;
        self.api.course_status(&username, course_id).await
    }
}
