use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::consumers::{DecisionConsumer, Suggestion};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Accept,
    Decline,
}

/// Anything but an explicit yes is a no.
pub fn parse_answer(line: &str) -> Answer {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Accept,
        _ => Answer::Decline,
    }
}

/// Resolves suggestions from the decision consumer. With `interactive` set each one
/// is put to the user on stdin; otherwise suggestions are only logged.
pub async fn suggestion_prompt(
    consumer: DecisionConsumer,
    suggestions: mpsc::Receiver<Suggestion>,
    interactive: bool,
    cancel_token: CancellationToken,
) {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    answer_suggestions(consumer, suggestions, interactive, lines, cancel_token).await;
}

/// Prompt loop over any line source. Only an explicit answer touches task state;
/// when input ends, remaining suggestions are logged and left open.
pub async fn answer_suggestions<R>(
    consumer: DecisionConsumer,
    mut suggestions: mpsc::Receiver<Suggestion>,
    interactive: bool,
    mut lines: Lines<R>,
    cancel_token: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let suggestion = tokio::select! {
            _ = cancel_token.cancelled() => break,
            next = suggestions.recv() => match next {
                Some(suggestion) => suggestion,
                None => break,
            },
        };

        if !interactive {
            log_suggestion(&suggestion);
            continue;
        }

        // The user may have moved on while an earlier prompt was open.
        if consumer.state().current().as_ref() != Some(&suggestion.task_id) {
            log_debug!("skipping stale suggestion for {}", suggestion.task_id);
            continue;
        }

        let annotation = &suggestion.annotation;
        println!(
            "\nLooks like you're {} ({} / {}).\n{}\nWant help? [y/N] ",
            annotation.task_label, annotation.app, annotation.window_title, annotation.summary
        );

        let line = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => line,
        };

        let answer = match line {
            Ok(Some(line)) => parse_answer(&line),
            Ok(None) => {
                log_warn!("stdin closed; further suggestions will be logged only");
                log_suggestion(&suggestion);
                suggestion_log_only(&mut suggestions, &cancel_token).await;
                break;
            }
            Err(err) => {
                log_warn!("failed to read answer for {}: {err}", suggestion.task_id);
                continue;
            }
        };

        match answer {
            Answer::Accept => match consumer.accept(&suggestion).await {
                Ok(plan) => println!("Done:\n{plan}"),
                Err(err) => log_warn!("automation for {} failed: {err:#}", suggestion.task_id),
            },
            Answer::Decline => consumer.decline(&suggestion.task_id),
        }
    }

    log_info!("suggestion prompt shutting down");
}

fn log_suggestion(suggestion: &Suggestion) {
    let annotation = &suggestion.annotation;
    log_info!(
        "suggestion for '{}' in {} ({}): {}",
        annotation.task_label,
        annotation.app,
        suggestion.reason,
        annotation.summary
    );
}

async fn suggestion_log_only(
    suggestions: &mut mpsc::Receiver<Suggestion>,
    cancel_token: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            next = suggestions.recv() => match next {
                Some(suggestion) => log_suggestion(&suggestion),
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AutomationExecutor;
    use crate::consumers::AnnotationHandler;
    use crate::models::{ActivityKind, Annotation};
    use crate::tasks::{compute_task_id, TaskId, TaskStateStore};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoPlan;

    #[async_trait]
    impl AutomationExecutor for EchoPlan {
        async fn plan_and_execute(&self, annotation: &Annotation) -> Result<String> {
            Ok(format!("fix {}", annotation.task_label))
        }
    }

    fn blocked(label: &str) -> Arc<Annotation> {
        Arc::new(Annotation::new(label, "Terminal", "shell", 0.9, ActivityKind::Blocked).unwrap())
    }

    /// Feeds `annotations` through a decision consumer, then answers the resulting
    /// suggestions from `input` until `settle` has passed.
    async fn run_prompt(
        annotations: &[Arc<Annotation>],
        input: &'static str,
        settle: Duration,
    ) -> TaskStateStore {
        let state = TaskStateStore::new();
        let (consumer, rx) = DecisionConsumer::new(state.clone(), 0.4, 8);
        let consumer = consumer.with_executor(Arc::new(EchoPlan));
        for annotation in annotations {
            consumer.handle(annotation.clone()).await.unwrap();
        }

        let token = CancellationToken::new();
        let lines = BufReader::new(input.as_bytes()).lines();
        let handle = tokio::spawn(answer_suggestions(consumer, rx, true, lines, token.clone()));

        tokio::time::sleep(settle).await;
        token.cancel();
        handle.await.unwrap();
        state
    }

    fn id(annotation: &Annotation) -> TaskId {
        compute_task_id(annotation)
    }

    #[tokio::test]
    async fn closed_input_leaves_task_open() {
        let task = blocked("Debugging Python");
        let state = run_prompt(&[task.clone()], "", Duration::from_millis(50)).await;

        assert!(!state.was_declined(&id(&task)));
        assert!(!state.was_completed(&id(&task)));
        assert!(!state.is_inert(&id(&task)));
    }

    #[tokio::test]
    async fn explicit_no_declines() {
        let task = blocked("Debugging Python");
        let state = run_prompt(&[task.clone()], "n\n", Duration::from_millis(50)).await;
        assert!(state.was_declined(&id(&task)));
    }

    #[tokio::test]
    async fn yes_runs_the_executor_and_completes() {
        let task = blocked("Debugging Python");
        let state = run_prompt(&[task.clone()], "y\n", Duration::from_millis(50)).await;
        assert!(state.was_completed(&id(&task)));
        assert!(!state.was_declined(&id(&task)));
    }

    #[tokio::test]
    async fn stale_suggestion_is_skipped_without_an_answer() {
        let earlier = blocked("Debugging Python");
        let later = blocked("Fixing CI");
        let state = run_prompt(
            &[earlier.clone(), later.clone()],
            "n\n",
            Duration::from_millis(50),
        )
        .await;

        // The one answer went to the task that is current, not the stale one.
        assert!(!state.was_declined(&id(&earlier)));
        assert!(state.was_declined(&id(&later)));
    }

    #[test]
    fn only_explicit_yes_accepts() {
        assert_eq!(parse_answer("y"), Answer::Accept);
        assert_eq!(parse_answer(" YES \n"), Answer::Accept);
        assert_eq!(parse_answer(""), Answer::Decline);
        assert_eq!(parse_answer("n"), Answer::Decline);
        assert_eq!(parse_answer("sure"), Answer::Decline);
    }
}
