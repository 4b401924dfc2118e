//! # Admission Control
//!
//! Decides whether an inbound push or comment event becomes a grading task.
//!
//! Push events are always admitted. A comment event is admitted only when all
//! of the following hold, checked in this order:
//!
//! 1. the comment mentions the bot (`NotRequested` otherwise);
//! 2. the deliverable can be resolved from the course configuration
//!    (`UnresolvedDeliverable`);
//! 3. feedback for this exact (user, deliverable, commit) has not already been
//!    delivered (`AlreadyGraded`);
//! 4. at least the cooldown interval has elapsed since the requester's last
//!    admitted request for the deliverable (`TooSoon`).
//!
//! [`AdmissionController::admit_comment`] only reads the history it is handed.
//! [`AdmissionController::admit_comment_and_record`] checks and records the
//! request inside one history transaction, so two comments racing for the
//! same (user, deliverable) cannot both pass the cooldown.
//!
//! When the course names a grading image for the resolved deliverable, the
//! admitted task carries a complete [`ContainerInput`] for the executor.

use crate::course_registry::DeliverableResolver;
use crate::history::{AdmissionHistory, InMemoryAdmissionHistory};
use common::task_id::TaskId;
use common::types::{CommentEvent, ContainerConfig, ContainerInput, PushEvent, UserInfo};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use util::config::AppConfig;

/// Why an event was not turned into a task. The `Display` text is meant for
/// the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejected {
    #[error(
        "Feedback for {deliv_id} was requested too recently; please wait {} before requesting it again.",
        format_wait(.remaining)
    )]
    TooSoon {
        deliv_id: String,
        remaining: Duration,
    },
    #[error("Feedback for {deliv_id} on this commit has already been given to {user_name}.")]
    AlreadyGraded {
        user_name: String,
        deliv_id: String,
        commit_url: String,
    },
    #[error("Could not determine which deliverable to grade; please name one in your comment.")]
    UnresolvedDeliverable,
    #[error("The comment did not ask the bot for feedback.")]
    NotRequested,
}

impl AdmissionRejected {
    /// Human-readable reason, suitable for posting back to the user.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionRejected::TooSoon { .. } => "TooSoon",
            AdmissionRejected::AlreadyGraded { .. } => "AlreadyGraded",
            AdmissionRejected::UnresolvedDeliverable => "UnresolvedDeliverable",
            AdmissionRejected::NotRequested => "NotRequested",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Push,
    Comment,
}

/// Descriptor of an admitted request, ready to be handed to the executor.
///
/// `input` is `None` when no grading image is configured for the deliverable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmittedTask {
    pub task_id: TaskId,
    pub trigger: Trigger,
    pub repo: String,
    pub commit: String,
    pub commit_url: String,
    pub deliv_id: Option<String>,
    pub course_id: Option<String>,
    pub user_name: Option<String>,
    pub requested_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<ContainerInput>,
}

pub struct AdmissionController {
    resolver: Arc<dyn DeliverableResolver>,
    cooldown: Duration,
}

impl AdmissionController {
    pub fn new(resolver: Arc<dyn DeliverableResolver>, cooldown: Duration) -> Self {
        Self { resolver, cooldown }
    }

    pub fn from_config(resolver: Arc<dyn DeliverableResolver>, config: &AppConfig) -> Self {
        Self::new(resolver, config.feedback_cooldown)
    }

    /// Push events are always admitted; concurrency is capped elsewhere.
    ///
    /// The course comes from the repository's organisation and the
    /// deliverable is the course's current one.
    pub fn admit_push(&self, event: &PushEvent) -> AdmittedTask {
        let course_id = self
            .resolver
            .course_for_org(org_from_project_url(&event.project_url));
        let deliv_id = course_id
            .as_deref()
            .and_then(|course| self.resolver.resolve(Some(course), None));
        let input = self.container_input(
            event.clone(),
            course_id.as_deref(),
            deliv_id.as_deref(),
            None,
        );

        let task = AdmittedTask {
            task_id: TaskId::for_commit(None, &event.repo, &event.commit),
            trigger: Trigger::Push,
            repo: event.repo.clone(),
            commit: event.commit.clone(),
            commit_url: event.commit_url.clone(),
            deliv_id,
            course_id,
            user_name: None,
            requested_at: event.timestamp,
            input,
        };
        tracing::info!(
            task_id = %task.task_id,
            repo = %event.repo,
            runnable = task.input.is_some(),
            "push admitted"
        );
        task
    }

    /// Admits a comment and records it as the requester's latest request,
    /// holding the history's write lock for both steps.
    pub fn admit_comment_and_record(
        &self,
        event: &CommentEvent,
        history: &InMemoryAdmissionHistory,
    ) -> Result<AdmittedTask, AdmissionRejected> {
        history.transaction(|txn| {
            let task = self.admit_comment(event, &*txn)?;
            if let Some(deliv_id) = &task.deliv_id {
                txn.record_request(&event.user_name, deliv_id, task.requested_at);
            }
            Ok(task)
        })
    }

    pub fn admit_comment(
        &self,
        event: &CommentEvent,
        history: &dyn AdmissionHistory,
    ) -> Result<AdmittedTask, AdmissionRejected> {
        let decision = self.evaluate_comment(event, history);
        match &decision {
            Ok(task) => tracing::info!(
                task_id = %task.task_id,
                user = %event.user_name,
                "comment admitted"
            ),
            Err(rejection) => tracing::info!(
                user = %event.user_name,
                commit_url = %event.commit_url,
                kind = rejection.kind(),
                "comment rejected"
            ),
        }
        decision
    }

    fn evaluate_comment(
        &self,
        event: &CommentEvent,
        history: &dyn AdmissionHistory,
    ) -> Result<AdmittedTask, AdmissionRejected> {
        if !event.bot_mentioned {
            return Err(AdmissionRejected::NotRequested);
        }

        let deliv_id = self
            .resolver
            .resolve(event.course_id.as_deref(), event.deliv_id.as_deref())
            .ok_or(AdmissionRejected::UnresolvedDeliverable)?;

        if history.has_feedback(&event.user_name, &deliv_id, &event.commit_url) {
            return Err(AdmissionRejected::AlreadyGraded {
                user_name: event.user_name.clone(),
                deliv_id,
                commit_url: event.commit_url.clone(),
            });
        }

        let cooldown = event
            .course_id
            .as_deref()
            .and_then(|course| self.resolver.cooldown_for(course))
            .unwrap_or(self.cooldown);

        if let Some(last) = history.last_request_timestamp(&event.user_name, &deliv_id) {
            let elapsed = Duration::from_millis(event.timestamp.saturating_sub(last).max(0) as u64);
            if elapsed < cooldown {
                return Err(AdmissionRejected::TooSoon {
                    deliv_id,
                    remaining: cooldown - elapsed,
                });
            }
        }

        let repo = if event.repo.is_empty() {
            repo_from_commit_url(&event.commit_url)
        } else {
            event.repo.clone()
        };
        let project_url = if event.project_url.is_empty() {
            project_from_commit_url(&event.commit_url).to_string()
        } else {
            event.project_url.clone()
        };
        let push_info = PushEvent {
            branch: String::new(),
            commit: event.commit.clone(),
            commit_url: event.commit_url.clone(),
            project_url,
            repo: repo.clone(),
            timestamp: event.timestamp,
            clone_url: None,
        };
        let input = self.container_input(
            push_info,
            event.course_id.as_deref(),
            Some(&deliv_id),
            Some(&event.user_name),
        );

        Ok(AdmittedTask {
            task_id: TaskId::for_commit(Some(&deliv_id), &repo, &event.commit),
            trigger: Trigger::Comment,
            repo,
            commit: event.commit.clone(),
            commit_url: event.commit_url.clone(),
            deliv_id: Some(deliv_id),
            course_id: event.course_id.clone(),
            user_name: Some(event.user_name.clone()),
            requested_at: event.timestamp,
            input,
        })
    }

    fn container_input(
        &self,
        push_info: PushEvent,
        course_id: Option<&str>,
        deliv_id: Option<&str>,
        user_name: Option<&str>,
    ) -> Option<ContainerInput> {
        let (course_id, deliv_id) = (course_id?, deliv_id?);
        let docker_image = self.resolver.image_for(course_id, deliv_id)?;
        Some(ContainerInput {
            push_info,
            course_id: course_id.to_string(),
            deliv_id: deliv_id.to_string(),
            deliverable_info: None,
            user_info: user_name.map(|name| UserInfo {
                username: name.to_string(),
                ..UserInfo::default()
            }),
            container_config: ContainerConfig {
                docker_image,
                custom: serde_json::json!({}),
            },
            github_keys: None,
            team_id: None,
            course_num: None,
        })
    }
}

/// `https://host/org/repo/commit/<sha>` → `https://host/org/repo`.
fn project_from_commit_url(commit_url: &str) -> &str {
    commit_url
        .split("/commit/")
        .next()
        .unwrap_or(commit_url)
        .trim_end_matches('/')
}

/// `https://host/org/repo/commit/<sha>` → `repo`.
fn repo_from_commit_url(commit_url: &str) -> String {
    project_from_commit_url(commit_url)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// `https://host/org/repo/` → `org`.
fn org_from_project_url(project_url: &str) -> &str {
    project_url
        .trim_end_matches('/')
        .rsplit('/')
        .nth(1)
        .unwrap_or_default()
}

/// Renders a wait as `"1h 2m 3s"`, dropping leading zero units and rounding
/// sub-second remainders up.
pub fn format_wait(remaining: &Duration) -> String {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course_registry::{CoursePolicy, CourseRegistry};
    use crate::history::InMemoryAdmissionHistory;
    use common::types::FeedbackRecord;
    use std::collections::HashMap;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COMMIT_URL: &str = "https://github.ugrad.cs.ubc.ca/CPSC310-2017W-T2/d0_team999/commit/abe1b0918b872997de4c4d2baf4c263f8d4c6dc2";
    const T0: i64 = 1516472873288;
    const T1: i64 = 1516523258762;

    fn registry(cooldown_secs: Option<u64>) -> Arc<dyn DeliverableResolver> {
        Arc::new(
            CourseRegistry::new(vec![CoursePolicy {
                course_id: "310".into(),
                deliverables: vec!["d0".into(), "d1".into()],
                current_deliverable: Some("d1".into()),
                cooldown_secs,
                org: Some("CPSC310-2017W-T2".into()),
                images: HashMap::from([("d1".to_string(), "grader-d1".to_string())]),
            }])
            .unwrap(),
        )
    }

    fn controller(cooldown: Duration) -> AdmissionController {
        AdmissionController::new(registry(None), cooldown)
    }

    fn comment(timestamp: i64) -> CommentEvent {
        CommentEvent {
            repo: String::new(),
            commit: "abe1b0918b872997de4c4d2baf4c263f8d4c6dc2".into(),
            commit_url: COMMIT_URL.into(),
            project_url: String::new(),
            user_name: "cs310test".into(),
            course_id: Some("310".into()),
            deliv_id: Some("d1".into()),
            timestamp,
            bot_mentioned: true,
        }
    }

    fn push() -> PushEvent {
        PushEvent {
            branch: "master".into(),
            commit: "abe1b0918b872997de4c4d2baf4c263f8d4c6dc2".into(),
            commit_url: COMMIT_URL.into(),
            project_url: "https://github.ugrad.cs.ubc.ca/CPSC310-2017W-T2/d0_team999/".into(),
            repo: "d0_team999".into(),
            timestamp: 1516472872288,
            clone_url: None,
        }
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn push_is_always_admitted() {
        let ctl = controller(DAY);
        let task = ctl.admit_push(&push());
        assert_eq!(task.trigger, Trigger::Push);
        assert_eq!(task.repo, "d0_team999");
        assert_eq!(task.task_id.as_str(), "push_d0_team999_abe1b0918b87");
        assert_eq!(task.course_id.as_deref(), Some("310"));
        assert_eq!(task.deliv_id.as_deref(), Some("d1"));

        let input = task.input.expect("push for a known org is runnable");
        assert_eq!(input.course_id, "310");
        assert_eq!(input.deliv_id, "d1");
        assert_eq!(input.container_config.docker_image, "grader-d1");
        assert_eq!(input.push_info, push());
        assert!(input.user_info.is_none());
    }

    #[test]
    fn push_from_unknown_org_is_admitted_without_input() {
        let ctl = controller(DAY);
        let mut event = push();
        event.project_url = "https://github.ugrad.cs.ubc.ca/CPSC340/d0_team999/".into();
        let task = ctl.admit_push(&event);
        assert_eq!(task.trigger, Trigger::Push);
        assert_eq!(task.course_id, None);
        assert_eq!(task.deliv_id, None);
        assert!(task.input.is_none());
    }

    #[test]
    fn admitted_comment_carries_container_input() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();
        let task = ctl.admit_comment(&comment(T0), &history).unwrap();
        let input = task.input.expect("d1 has a grading image");
        assert_eq!(input.deliv_id, "d1");
        assert_eq!(input.container_config.docker_image, "grader-d1");
        assert_eq!(input.push_info.commit_url, COMMIT_URL);
        assert_eq!(
            input.push_info.project_url,
            "https://github.ugrad.cs.ubc.ca/CPSC310-2017W-T2/d0_team999"
        );
        assert_eq!(input.push_info.repo, "d0_team999");
        assert_eq!(input.user_info.map(|u| u.username).as_deref(), Some("cs310test"));

        let mut no_image = comment(T0);
        no_image.deliv_id = Some("d0".into());
        let task = ctl.admit_comment(&no_image, &history).unwrap();
        assert!(task.input.is_none());
    }

    #[test]
    fn admit_and_record_sets_the_cooldown() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();

        let mut silent = comment(T0);
        silent.bot_mentioned = false;
        assert!(ctl.admit_comment_and_record(&silent, &history).is_err());
        assert_eq!(history.last_request_timestamp("cs310test", "d1"), None);

        ctl.admit_comment_and_record(&comment(T0), &history).unwrap();
        assert_eq!(history.last_request_timestamp("cs310test", "d1"), Some(T0));
        let err = ctl.admit_comment_and_record(&comment(T0 + 1), &history).unwrap_err();
        assert_eq!(err.kind(), "TooSoon");
        assert_eq!(history.last_request_timestamp("cs310test", "d1"), Some(T0));
    }

    #[test]
    fn concurrent_comments_admit_one_per_cooldown() {
        const THREADS: usize = 8;
        let ctl = controller(DAY);

        for _ in 0..50 {
            let history = InMemoryAdmissionHistory::new();
            let barrier = Barrier::new(THREADS);
            let admitted = AtomicUsize::new(0);

            std::thread::scope(|s| {
                for i in 0..THREADS {
                    let (ctl, history, barrier, admitted) = (&ctl, &history, &barrier, &admitted);
                    s.spawn(move || {
                        barrier.wait();
                        let event = comment(T0 + i as i64);
                        if ctl.admit_comment_and_record(&event, history).is_ok() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
            });

            assert_eq!(admitted.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn first_comment_is_admitted() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();
        let task = ctl.admit_comment(&comment(T0), &history).unwrap();
        assert_eq!(task.trigger, Trigger::Comment);
        assert_eq!(task.deliv_id.as_deref(), Some("d1"));
        assert_eq!(task.user_name.as_deref(), Some("cs310test"));
        assert_eq!(task.repo, "d0_team999");
        assert_eq!(task.requested_at, T0);
    }

    #[test]
    fn second_comment_within_cooldown_is_too_soon() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();
        ctl.admit_comment(&comment(T0), &history).unwrap();
        history.record_request("cs310test", "d1", T0);

        let err = ctl.admit_comment(&comment(T1), &history).unwrap_err();
        let elapsed = Duration::from_millis((T1 - T0) as u64);
        assert_eq!(
            err,
            AdmissionRejected::TooSoon {
                deliv_id: "d1".into(),
                remaining: DAY - elapsed,
            }
        );
        assert!(err.reason().contains("please wait 10h"), "{}", err.reason());
    }

    #[test]
    fn cooldown_boundary() {
        let cooldown = Duration::from_secs(60);
        let ctl = controller(cooldown);
        let history = InMemoryAdmissionHistory::new();
        history.record_request("cs310test", "d1", T0);

        let just_before = ctl.admit_comment(&comment(T0 + 59_999), &history);
        assert!(matches!(
            just_before,
            Err(AdmissionRejected::TooSoon { remaining, .. }) if remaining == Duration::from_millis(1)
        ));

        assert!(ctl.admit_comment(&comment(T0 + 60_000), &history).is_ok());
        assert!(ctl.admit_comment(&comment(T0 + 600_000), &history).is_ok());
    }

    #[test]
    fn cooldown_is_scoped_per_deliverable() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();
        history.record_request("cs310test", "d0", T0);
        assert!(ctl.admit_comment(&comment(T0 + 1_000), &history).is_ok());
    }

    #[test]
    fn delivered_feedback_is_already_graded_even_after_cooldown() {
        let ctl = controller(Duration::from_secs(1));
        let history = InMemoryAdmissionHistory::new();
        history.record_request("cs310test", "d1", T0);
        history.record_feedback(FeedbackRecord {
            user_name: "cs310test".into(),
            course_id: "310".into(),
            deliv_id: "d1".into(),
            timestamp: T0 + 1_000,
            commit_url: COMMIT_URL.into(),
        });

        let err = ctl.admit_comment(&comment(T1), &history).unwrap_err();
        assert_eq!(err.kind(), "AlreadyGraded");

        let mut other_commit = comment(T1);
        other_commit.commit_url = format!("{COMMIT_URL}ff");
        assert!(ctl.admit_comment(&other_commit, &history).is_ok());
    }

    #[test]
    fn already_graded_takes_precedence_over_too_soon() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();
        history.record_request("cs310test", "d1", T0);
        history.record_feedback(FeedbackRecord {
            user_name: "cs310test".into(),
            course_id: "310".into(),
            deliv_id: "d1".into(),
            timestamp: T0,
            commit_url: COMMIT_URL.into(),
        });
        let err = ctl.admit_comment(&comment(T0 + 1), &history).unwrap_err();
        assert_eq!(err.kind(), "AlreadyGraded");
    }

    #[test]
    fn unresolved_deliverable_is_rejected() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();

        let mut unknown_course = comment(T0);
        unknown_course.course_id = None;
        assert_eq!(
            ctl.admit_comment(&unknown_course, &history),
            Err(AdmissionRejected::UnresolvedDeliverable)
        );

        let mut unknown_deliv = comment(T0);
        unknown_deliv.deliv_id = Some("d7".into());
        assert_eq!(
            ctl.admit_comment(&unknown_deliv, &history),
            Err(AdmissionRejected::UnresolvedDeliverable)
        );

        let mut implicit = comment(T0);
        implicit.deliv_id = None;
        let task = ctl.admit_comment(&implicit, &history).unwrap();
        assert_eq!(task.deliv_id.as_deref(), Some("d1"));
    }

    #[test]
    fn comment_without_mention_is_not_requested() {
        let ctl = controller(DAY);
        let history = InMemoryAdmissionHistory::new();
        let mut silent = comment(T0);
        silent.bot_mentioned = false;
        assert_eq!(
            ctl.admit_comment(&silent, &history),
            Err(AdmissionRejected::NotRequested)
        );
    }

    #[test]
    fn course_cooldown_overrides_default() {
        let ctl = AdmissionController::new(registry(Some(10)), DAY);
        let history = InMemoryAdmissionHistory::new();
        history.record_request("cs310test", "d1", T0);
        assert!(ctl.admit_comment(&comment(T0 + 10_000), &history).is_ok());
    }

    #[test]
    fn out_of_order_timestamps_wait_the_full_interval() {
        let ctl = controller(Duration::from_secs(60));
        let history = InMemoryAdmissionHistory::new();
        history.record_request("cs310test", "d1", T1);
        let err = ctl.admit_comment(&comment(T0), &history).unwrap_err();
        assert_eq!(
            err,
            AdmissionRejected::TooSoon {
                deliv_id: "d1".into(),
                remaining: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn wait_formatting() {
        assert_eq!(format_wait(&Duration::from_millis(1)), "1s");
        assert_eq!(format_wait(&Duration::from_secs(61)), "1m 1s");
        assert_eq!(format_wait(&Duration::from_secs(3600 * 10 + 5)), "10h 0m 5s");
    }

    #[test]
    fn repo_is_derived_from_commit_url() {
        assert_eq!(repo_from_commit_url(COMMIT_URL), "d0_team999");
    }
}
