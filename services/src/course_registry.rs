//! Per-course grading policy, resolved once at startup.
//!
//! Courses are looked up by id in a map instead of being matched on names
//! at each call site. The registry is loaded from a JSON array:
//!
//! ```json
//! [
//!   {
//!     "courseId": "310",
//!     "org": "CPSC310-2017W-T2",
//!     "deliverables": ["d0", "d1"],
//!     "currentDeliverable": "d1",
//!     "cooldownSecs": 43200,
//!     "images": { "d0": "grader-d0", "d1": "grader-d1" }
//!   }
//! ]
//! ```
//!
//! `org` maps pushes, which carry no course id, onto a course. `images` names
//! the grading image per deliverable; a deliverable without one is admitted
//! but not run.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read course registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid course registry JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("course '{0}' is defined more than once")]
    Duplicate(String),
}

/// Maps a request context onto a concrete deliverable id.
pub trait DeliverableResolver: Send + Sync {
    /// Returns the deliverable to grade, or `None` when it cannot be determined.
    fn resolve(&self, course_id: Option<&str>, requested: Option<&str>) -> Option<String>;

    /// Course-specific cooldown override.
    fn cooldown_for(&self, _course_id: &str) -> Option<Duration> {
        None
    }

    /// Course owning the repositories of a git organisation.
    fn course_for_org(&self, _org: &str) -> Option<String> {
        None
    }

    /// Grading image for a deliverable.
    fn image_for(&self, _course_id: &str, _deliv_id: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePolicy {
    pub course_id: String,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub current_deliverable: Option<String>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub images: HashMap<String, String>,
}

#[derive(Debug, Default, Clone)]
pub struct CourseRegistry {
    courses: HashMap<String, CoursePolicy>,
}

impl CourseRegistry {
    pub fn new(policies: Vec<CoursePolicy>) -> Result<Self, RegistryError> {
        let mut courses = HashMap::with_capacity(policies.len());
        for policy in policies {
            let id = policy.course_id.clone();
            if courses.insert(id.clone(), policy).is_some() {
                return Err(RegistryError::Duplicate(id));
            }
        }
        Ok(Self { courses })
    }

    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        let policies: Vec<CoursePolicy> = serde_json::from_str(&content)?;
        Self::new(policies)
    }

    pub fn get(&self, course_id: &str) -> Option<&CoursePolicy> {
        self.courses.get(course_id)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

impl DeliverableResolver for CourseRegistry {
    fn resolve(&self, course_id: Option<&str>, requested: Option<&str>) -> Option<String> {
        let policy = self.get(course_id?)?;
        match requested.map(str::trim).filter(|d| !d.is_empty()) {
            Some(deliv) => policy
                .deliverables
                .iter()
                .find(|known| known.as_str() == deliv)
                .cloned(),
            None => policy.current_deliverable.clone(),
        }
    }

    fn cooldown_for(&self, course_id: &str) -> Option<Duration> {
        self.get(course_id)?.cooldown_secs.map(Duration::from_secs)
    }

    fn course_for_org(&self, org: &str) -> Option<String> {
        self.courses
            .values()
            .find(|policy| policy.org.as_deref().is_some_and(|o| o.eq_ignore_ascii_case(org)))
            .map(|policy| policy.course_id.clone())
    }

    fn image_for(&self, course_id: &str, deliv_id: &str) -> Option<String> {
        self.get(course_id)?
            .images
            .get(deliv_id)
            .filter(|image| !image.trim().is_empty())
            .cloned()
    }
}
