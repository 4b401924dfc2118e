use crate::manager::manager::GradeManager;
use code_runner::GradeTaskExecutor;
use services::admission_service::AdmissionController;
use services::course_registry::{CourseRegistry, RegistryError};
use services::history::InMemoryAdmissionHistory;
use std::sync::Arc;
use util::config::AppConfig;

/// Shared handles for every request handler. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub manager: GradeManager,
    pub admission: Arc<AdmissionController>,
    pub history: Arc<InMemoryAdmissionHistory>,
}

impl AppState {
    /// Wires the production collaborators: git-backed fetching, the configured
    /// container runtime and the course registry from `COURSES_FILE`.
    pub fn new(config: AppConfig) -> Result<Self, RegistryError> {
        let config = Arc::new(config);
        let registry = match &config.courses_file {
            Some(path) => CourseRegistry::load_from_json(path)?,
            None => CourseRegistry::default(),
        };
        tracing::info!(courses = registry.len(), "Course registry loaded");

        let executor = Arc::new(GradeTaskExecutor::from_config(Arc::clone(&config)));
        Ok(Self::with_parts(config, executor, registry))
    }

    pub fn with_parts(
        config: Arc<AppConfig>,
        executor: Arc<GradeTaskExecutor>,
        registry: CourseRegistry,
    ) -> Self {
        let manager = GradeManager::new(executor, config.max_concurrent_tasks);
        let admission = AdmissionController::from_config(Arc::new(registry), &config);
        Self {
            config,
            manager,
            admission: Arc::new(admission),
            history: Arc::new(InMemoryAdmissionHistory::new()),
        }
    }
}
