use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::backend::AutomationExecutor;
use crate::models::Annotation;
use crate::tasks::{compute_task_id, TaskId, TaskStateStore};

use super::AnnotationHandler;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Act(String),
    Reject(String),
}

/// Should this annotation turn into an offer of help?
pub fn filter(annotation: &Annotation, min_confidence: f64) -> FilterVerdict {
    if annotation.confidence < min_confidence {
        return FilterVerdict::Reject(format!(
            "low confidence ({:.2} < {:.2})",
            annotation.confidence, min_confidence
        ));
    }
    if annotation.activity.wants_help() {
        FilterVerdict::Act(format!("user looks {}", annotation.activity.as_str()))
    } else {
        FilterVerdict::Reject(format!(
            "activity {} needs no help",
            annotation.activity.as_str()
        ))
    }
}

/// An offer of help awaiting the user's yes or no.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub task_id: TaskId,
    pub annotation: Arc<Annotation>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum Decision {
    /// Same task as the one already being tracked.
    Duplicate(TaskId),
    /// The user already declined or completed this task.
    Inert(TaskId),
    Rejected { task_id: TaskId, reason: String },
    Suggested(Suggestion),
}

/// Turns new tasks that look like the user is stuck into suggestions.
#[derive(Clone)]
pub struct DecisionConsumer {
    state: TaskStateStore,
    executor: Option<Arc<dyn AutomationExecutor>>,
    suggestions: mpsc::Sender<Suggestion>,
    min_confidence: f64,
}

impl DecisionConsumer {
    pub fn new(
        state: TaskStateStore,
        min_confidence: f64,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Suggestion>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let consumer = Self {
            state,
            executor: None,
            suggestions: tx,
            min_confidence,
        };
        (consumer, rx)
    }

    pub fn with_executor(mut self, executor: Arc<dyn AutomationExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn state(&self) -> &TaskStateStore {
        &self.state
    }

    pub fn decide(&self, annotation: Arc<Annotation>) -> Decision {
        let task_id = compute_task_id(&annotation);

        if !self.state.update_current(&task_id) {
            return Decision::Duplicate(task_id);
        }
        if self.state.is_inert(&task_id) {
            return Decision::Inert(task_id);
        }

        match filter(&annotation, self.min_confidence) {
            FilterVerdict::Reject(reason) => Decision::Rejected { task_id, reason },
            FilterVerdict::Act(reason) => Decision::Suggested(Suggestion {
                task_id,
                annotation,
                reason,
            }),
        }
    }

    /// The user said yes: run the automation and retire the task on success.
    pub async fn accept(&self, suggestion: &Suggestion) -> Result<String> {
        if self.state.is_inert(&suggestion.task_id) {
            bail!("task {} was already resolved", suggestion.task_id);
        }
        let Some(executor) = &self.executor else {
            bail!("no automation executor configured");
        };

        let plan = executor.plan_and_execute(&suggestion.annotation).await?;
        self.state.mark_completed(&suggestion.task_id);
        log_info!("completed task {}", suggestion.task_id);
        Ok(plan)
    }

    /// The user said no: never offer this task again.
    pub fn decline(&self, task_id: &TaskId) {
        self.state.decline(task_id);
        log_info!("declined task {task_id}");
    }
}

#[async_trait]
impl AnnotationHandler for DecisionConsumer {
    fn name(&self) -> &str {
        "decision"
    }

    async fn handle(&self, annotation: Arc<Annotation>) -> Result<()> {
        match self.decide(annotation) {
            Decision::Suggested(suggestion) => match self.suggestions.try_send(suggestion) {
                Ok(()) => {}
                Err(TrySendError::Full(s)) => {
                    log_warn!("suggestion queue full; dropping suggestion for {}", s.task_id)
                }
                Err(TrySendError::Closed(_)) => log_debug!("nobody is listening for suggestions"),
            },
            Decision::Rejected { task_id, reason } => {
                log_debug!("task {task_id} rejected: {reason}")
            }
            Decision::Duplicate(_) | Decision::Inert(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityKind;

    fn annotation(confidence: f64, activity: ActivityKind) -> Annotation {
        Annotation::new("Debugging Python", "Terminal", "shell", confidence, activity).unwrap()
    }

    struct PlanEcho;

    #[async_trait]
    impl AutomationExecutor for PlanEcho {
        async fn plan_and_execute(&self, annotation: &Annotation) -> Result<String> {
            Ok(format!("help with {}", annotation.task_label))
        }
    }

    #[test]
    fn confidence_threshold_boundary() {
        for kind in [ActivityKind::Blocked, ActivityKind::HelpSeeking, ActivityKind::Tedious] {
            assert!(matches!(
                filter(&annotation(0.39, kind), DEFAULT_MIN_CONFIDENCE),
                FilterVerdict::Reject(_)
            ));
            assert!(matches!(
                filter(&annotation(0.41, kind), DEFAULT_MIN_CONFIDENCE),
                FilterVerdict::Act(_)
            ));
        }
    }

    #[test]
    fn passive_activities_are_rejected_even_when_confident() {
        for kind in [ActivityKind::Passive, ActivityKind::Meeting, ActivityKind::Productive] {
            assert!(matches!(
                filter(&annotation(0.99, kind), DEFAULT_MIN_CONFIDENCE),
                FilterVerdict::Reject(_)
            ));
        }
    }

    #[test]
    fn filter_is_deterministic() {
        let a = annotation(0.6, ActivityKind::Tedious);
        assert_eq!(
            filter(&a, DEFAULT_MIN_CONFIDENCE),
            filter(&a, DEFAULT_MIN_CONFIDENCE)
        );
    }

    #[test]
    fn repeated_detection_is_suggested_once() {
        let (consumer, _rx) = DecisionConsumer::new(TaskStateStore::new(), DEFAULT_MIN_CONFIDENCE, 4);
        let a = Arc::new(annotation(0.9, ActivityKind::Blocked));

        assert!(matches!(consumer.decide(a.clone()), Decision::Suggested(_)));
        assert!(matches!(consumer.decide(a), Decision::Duplicate(_)));
    }

    #[test]
    fn declined_task_stays_quiet_after_switching_away_and_back() {
        let (consumer, _rx) = DecisionConsumer::new(TaskStateStore::new(), DEFAULT_MIN_CONFIDENCE, 4);
        let stuck = Arc::new(annotation(0.9, ActivityKind::Blocked));
        let other = Arc::new(
            Annotation::new("Email", "Mail", "Inbox", 0.9, ActivityKind::Tedious).unwrap(),
        );

        let Decision::Suggested(suggestion) = consumer.decide(stuck.clone()) else {
            panic!("expected a suggestion");
        };
        consumer.decline(&suggestion.task_id);

        assert!(matches!(consumer.decide(other), Decision::Suggested(_)));
        assert!(matches!(consumer.decide(stuck), Decision::Inert(_)));
    }

    #[tokio::test]
    async fn accept_runs_executor_and_marks_completed() {
        let state = TaskStateStore::new();
        let (consumer, _rx) = DecisionConsumer::new(state.clone(), DEFAULT_MIN_CONFIDENCE, 4);
        let consumer = consumer.with_executor(Arc::new(PlanEcho));

        let Decision::Suggested(suggestion) =
            consumer.decide(Arc::new(annotation(0.9, ActivityKind::HelpSeeking)))
        else {
            panic!("expected a suggestion");
        };

        let plan = consumer.accept(&suggestion).await.unwrap();
        assert_eq!(plan, "help with Debugging Python");
        assert!(state.was_completed(&suggestion.task_id));
        assert!(consumer.accept(&suggestion).await.is_err());
    }

    #[tokio::test]
    async fn accept_without_executor_fails_and_leaves_task_open() {
        let (consumer, _rx) = DecisionConsumer::new(TaskStateStore::new(), DEFAULT_MIN_CONFIDENCE, 4);
        let Decision::Suggested(suggestion) =
            consumer.decide(Arc::new(annotation(0.9, ActivityKind::Blocked)))
        else {
            panic!("expected a suggestion");
        };

        assert!(consumer.accept(&suggestion).await.is_err());
        assert!(!consumer.state().is_inert(&suggestion.task_id));
    }

    #[tokio::test]
    async fn handler_emits_suggestion_on_channel() {
        let (consumer, mut rx) = DecisionConsumer::new(TaskStateStore::new(), DEFAULT_MIN_CONFIDENCE, 4);
        consumer
            .handle(Arc::new(annotation(0.9, ActivityKind::Blocked)))
            .await
            .unwrap();
        consumer
            .handle(Arc::new(annotation(0.9, ActivityKind::Blocked)))
            .await
            .unwrap();

        let suggestion = rx.try_recv().unwrap();
        assert_eq!(suggestion.annotation.task_label, "Debugging Python");
        assert!(rx.try_recv().is_err());
    }
}
