use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::api::{ApiClient, OAuthApi, OAuthClient};
use crate::app::error::{CoursewareError, Result};
use crate::app::events::Notifier;
use crate::auth::{AuthService, Authenticator, Session};
use crate::config::Config;
use crate::connectivity::{FixedConnection, HostProbe, NetworkConnection};
use crate::course::CourseRepository;
use crate::download::{DownloadQueue, DownloadWorker, FileDownloader};
use crate::store::{SqliteStore, Store};

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store + Send + Sync>,
    pub session: Arc<Session>,
    pub notifier: Notifier,
    pub api: Arc<ApiClient>,
    pub auth: AuthService,
    pub courses: Arc<CourseRepository>,
    pub downloads: DownloadQueue,
    pub worker: DownloadWorker,
}

impl AppContext {
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };
        let download_dir = match &config.download_dir {
            Some(dir) => dir.clone(),
            None => Self::data_dir()?.join("downloads"),
        };

        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::new(&db_path)?);
        Self::build(config, store, download_dir)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let download_dir = config
            .download_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("courseware-downloads"));
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::in_memory()?);
        Self::build(config, store, download_dir)
    }

    fn build(
        config: Config,
        store: Arc<dyn Store + Send + Sync>,
        download_dir: PathBuf,
    ) -> Result<Self> {
        let notifier = Notifier::new();
        let session = Arc::new(Session::load(store.clone())?);

        let oauth: Arc<dyn OAuthApi + Send + Sync> = Arc::new(OAuthClient::new(&config)?);
        let authenticator = Arc::new(Authenticator::new(
            session.clone(),
            oauth.clone(),
            notifier.clone(),
            config.token_type,
            config.refresh_backoff(),
        ));
        let api = Arc::new(ApiClient::new(&config, session.clone(), authenticator)?);

        let connection: Arc<dyn NetworkConnection + Send + Sync> = if config.offline {
            Arc::new(FixedConnection(false))
        } else {
            let host = Url::parse(&config.api_host_url)?;
            Arc::new(HostProbe::new(&host, config.timeout()))
        };

        let auth = AuthService::new(oauth, api.clone(), session.clone(), notifier.clone());
        let courses = Arc::new(CourseRepository::new(
            api.clone(),
            store.clone(),
            connection,
            session.clone(),
        ));

        let downloader = Arc::new(FileDownloader::new(config.timeout())?);
        let downloads =
            DownloadQueue::new(store.clone(), download_dir, config.video_download_quality);
        let worker = DownloadWorker::new(store.clone(), downloader, notifier.clone());

        Ok(Self {
            config,
            store,
            session,
            notifier,
            api,
            auth,
            courses,
            downloads,
            worker,
        })
    }

    fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| CoursewareError::Config("Could not find data directory".into()))?;
        let courseware_dir = data_dir.join("courseware");
        std::fs::create_dir_all(&courseware_dir)?;
        Ok(courseware_dir)
    }

    fn default_db_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("courseware.db"))
    }
}
