use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL};
use reqwest::{Client, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::api::models::{
    BlocksCompletionBody, CourseEnrollmentsDto, CourseStatusDto, CourseStructureDto, UserDto,
};
use crate::api::{LmsApi, URL_COMPLETION_BATCH, URL_MY_USER_INFO};
use crate::app::{CoursewareError, Result};
use crate::auth::authenticator::token_from_header;
use crate::auth::{Authenticator, Session};
use crate::config::Config;
use crate::domain::{CourseStatus, CourseStructure, EnrolledCourse, User};

const BLOCKS_API_VERSION: &str = "v4";
const REQUESTED_FIELDS: &str = "contains_gated_content,show_gated_sections,special_exam_info,\
graded,format,student_view_multi_device,due,completion,offline_download";
/// Refetch, and never serve a stale copy from an intermediate cache on error.
const STALE_IF_ERROR: &str = "stale-if-error=0";
/// Stop following `next` links after this many enrollment pages.
const MAX_ENROLLMENT_PAGES: u32 = 50;

/// Authorized client for the LMS REST API.
///
/// Every request carries the stored access token. A 401 goes through the
/// [`Authenticator`] once; the retried request is never re-authenticated.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    session: Arc<Session>,
    authenticator: Arc<Authenticator>,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        session: Arc<Session>,
        authenticator: Arc<Authenticator>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("courseware/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.api_host_url)?,
            session,
            authenticator,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// `path` followed by percent-encoded `segments`.
    fn url_with_segments(&self, path: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.url(path)?;
        url.path_segments_mut()
            .map_err(|_| CoursewareError::Config(format!("Unusable API host: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorization(&self, token: &str) -> Option<HeaderValue> {
        let value = format!("{} {}", self.authenticator.token_type().as_str(), token);
        HeaderValue::from_str(&value).ok()
    }

    async fn execute(&self, mut request: Request) -> Result<Response> {
        let token = self.session.access_token();
        if !token.is_empty() {
            if let Some(value) = self.authorization(&token) {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }

        let retry = request.try_clone();
        let response = self.client.execute(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        let status = response.status();
        let body = response.bytes().await?;
        let Some(mut retry) = retry else {
            return Err(CoursewareError::Unauthorized(status));
        };

        let request_token = retry
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(token_from_header)
            .map(String::from);

        let Some(new_token) = self
            .authenticator
            .authenticate(request_token.as_deref(), &body)
            .await
        else {
            return Err(CoursewareError::Unauthorized(status));
        };

        debug!("Retrying {} {} with a new token", retry.method(), retry.url().path());
        if let Some(value) = self.authorization(&new_token) {
            retry.headers_mut().insert(AUTHORIZATION, value);
        }
        let response = self.client.execute(retry).await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.execute(builder.build()?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(CoursewareError::Unauthorized(status));
    }

    let message = response.text().await.unwrap_or_default();
    warn!("{} from LMS: {}", status, message);
    Err(CoursewareError::Api { status, message })
}

#[async_trait]
impl LmsApi for ApiClient {
    async fn profile(&self) -> Result<User> {
        let dto: UserDto = self
            .get_json(self.client.get(self.url(URL_MY_USER_INFO)?))
            .await?;
        Ok(dto.into_domain())
    }

    async fn enrolled_courses(&self, username: &str) -> Result<Vec<EnrolledCourse>> {
        let url = self.url_with_segments(
            "/api/mobile/v3/users/",
            &[username, "course_enrollments", ""],
        )?;

        let mut courses = Vec::new();
        for page in 1..=MAX_ENROLLMENT_PAGES {
            let dto: CourseEnrollmentsDto = self
                .get_json(self.client.get(url.clone()).query(&[("page", page)]))
                .await?;
            let (mut results, next) = dto.into_parts();
            courses.append(&mut results);
            if next.is_none() {
                break;
            }
        }

        debug!("Fetched {} enrollments for {}", courses.len(), username);
        Ok(courses)
    }

    async fn course_structure(&self, username: &str, course_id: &str) -> Result<CourseStructure> {
        let url = self.url(&format!(
            "/api/mobile/{}/course_info/blocks/",
            BLOCKS_API_VERSION
        ))?;
        let mut query = vec![
            ("depth", "all"),
            ("requested_fields", REQUESTED_FIELDS),
            ("student_view_data", "video,discussion,html"),
            ("block_counts", "video"),
            ("nav_depth", "3"),
        ];
        if !username.is_empty() {
            query.push(("username", username));
        }
        query.push(("course_id", course_id));

        let builder = self
            .client
            .get(url)
            .header(CACHE_CONTROL, STALE_IF_ERROR)
            .query(&query);

        let dto: CourseStructureDto = self.get_json(builder).await?;
        Ok(dto.into_domain(course_id))
    }

    async fn course_status(&self, username: &str, course_id: &str) -> Result<CourseStatus> {
        let url = self.url_with_segments(
            "/api/mobile/v1/users/",
            &[username, "course_status_info", course_id],
        )?;
        let dto: CourseStatusDto = self.get_json(self.client.get(url)).await?;
        Ok(dto.into_domain())
    }

    async fn mark_blocks_completion(
        &self,
        username: &str,
        course_id: &str,
        block_ids: &[String],
    ) -> Result<()> {
        let body = BlocksCompletionBody::new(username, course_id, block_ids);
        let request = self
            .client
            .post(self.url(URL_COMPLETION_BATCH)?)
            .json(&body)
            .build()?;
        self.execute(request).await?;
        Ok(())
    }
}
