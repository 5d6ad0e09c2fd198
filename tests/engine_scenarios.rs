//! End-to-end scenarios driving the full engine with scripted collaborators.

use async_trait::async_trait;
use mandate::approval::{ApprovalLedger, ApprovalStatus};
use mandate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use mandate::collab::{
    ApprovalAction, ApprovalDecision, ApprovalNotification, ApprovalNotifier, ModelClient,
};
use mandate::mail::MessageType;
use mandate::phase::Phase;
use mandate::role::Role;
use mandate::state::{Priority, ProgressResult};
use mandate::{ContractIntake, Engine, EngineConfig, RunOutcome};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers per-role from scripted queues; when a queue is down to its last
/// entry that entry repeats.
#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<HashMap<Role, VecDeque<String>>>,
    planner_prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self::default()
    }

    fn say(self, role: Role, lines: &[&str]) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(role, lines.iter().map(|s| s.to_string()).collect());
        self
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        role: Role,
        _system: &str,
        user: &str,
        _max_tokens: u32,
    ) -> anyhow::Result<String> {
        if role == Role::Planner {
            self.planner_prompts.lock().unwrap().push(user.to_string());
        }
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.entry(role).or_default();
        let answer = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(answer)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<ApprovalNotification>>,
}

#[async_trait]
impl ApprovalNotifier for RecordingNotifier {
    async fn notify(&self, notification: &ApprovalNotification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn engine_with(model: ScriptedModel, config: EngineConfig) -> Engine {
    Engine::new(
        config,
        Arc::new(model),
        Arc::new(RecordingNotifier::default()),
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(ApprovalLedger::new()),
    )
}

fn executions(state: &mandate::state::ContractState) -> usize {
    state
        .mail_log
        .iter()
        .filter(|m| m.from == Role::Executor && m.message_type == MessageType::StatusReport)
        .count()
}

#[tokio::test]
async fn scenario_first_attempt_passes_and_is_approved() {
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- gather data\n- write summary"])
        .say(Role::Executor, &["ACCEPT", "the summary"])
        .say(Role::Reviewer, &["PASS\ncomplete and correct"])
        .say(Role::Director, &["APPROVE"]);
    let engine = engine_with(model, EngineConfig::default());

    let outcome = engine
        .run(ContractIntake::new("summarize quarterly numbers").with_priority(Priority::High))
        .await
        .unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    assert!(state.approved);
    assert!(!state.escalated);
    assert_eq!(state.attempt_count, 1);
    assert_eq!(state.phase, Phase::Completed);
    assert_eq!(state.final_result, "the summary");
    assert!(state.mail_rejections.is_empty());
}

#[tokio::test]
async fn scenario_persistent_failure_escalates_after_exact_budget() {
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "an attempt"])
        .say(Role::Reviewer, &["FAIL\nnot acceptable"]);
    let engine = engine_with(model, EngineConfig::default().with_max_attempts(2));

    let outcome = engine.run(ContractIntake::new("impossible task")).await.unwrap();

    let RunOutcome::Escalated(state) = outcome else {
        panic!("expected escalation");
    };
    assert!(state.escalated);
    assert!(!state.approved);
    assert_eq!(state.attempt_count, 2);
    assert_eq!(state.phase, Phase::Escalated);
    // Exactly two executions for a budget of two, never a third.
    assert_eq!(executions(&state), 2);
    // The escalation itself is mailed up to the director.
    assert!(state
        .mail_log
        .iter()
        .any(|m| m.to == Role::Director && m.message_type == MessageType::Escalation));
}

#[tokio::test]
async fn scenario_failure_then_pass_consumes_two_attempts() {
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "draft one", "draft two"])
        .say(Role::Reviewer, &["FAIL\nmissing the appendix", "PASS\nfixed"])
        .say(Role::Director, &["APPROVE"]);
    let engine = engine_with(model, EngineConfig::default());

    let outcome = engine.run(ContractIntake::new("write the report")).await.unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    assert!(state.approved);
    assert_eq!(state.attempt_count, 2);
    assert_eq!(state.final_result, "draft two");
    // The rework instruction carried the reviewer's feedback.
    assert!(state
        .mail_log
        .iter()
        .any(|m| m.message_type == MessageType::Instruction
            && m.body.contains("missing the appendix")));
}

#[tokio::test]
async fn scenario_unplaceable_assignment_escalates_without_execution() {
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["REJECT\nfully booked"]);
    let engine = engine_with(model, EngineConfig::default().with_max_attempts(3));

    let outcome = engine.run(ContractIntake::new("unwanted task")).await.unwrap();

    let RunOutcome::Escalated(state) = outcome else {
        panic!("expected escalation");
    };
    assert!(state.escalated);
    assert_eq!(state.attempt_count, 3);
    // Execution never ran: no output, no executor status reports.
    assert!(state.output.is_empty());
    assert_eq!(executions(&state), 0);
    // Every rejection was mailed back to the planner.
    assert!(
        state
            .mail_log
            .iter()
            .filter(|m| m.message_type == MessageType::Rejection)
            .count()
            >= 3
    );
}

#[tokio::test]
async fn progress_checked_contract_completes_after_an_on_track_check() {
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "the deliverable"])
        .say(Role::Reviewer, &["PASS\nsolid"])
        .say(Role::Director, &["APPROVE"]);
    let engine = engine_with(
        model,
        EngineConfig::default().with_progress_checks(Duration::from_secs(30), 3),
    );

    let outcome = engine.run(ContractIntake::new("long running task")).await.unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    assert!(state.approved);
    // One check, one real execution; the post-check re-entry is report-only.
    assert_eq!(state.attempt_count, 1);
    assert_eq!(state.progress.check_count, 1);
    assert_eq!(state.progress.last_result, Some(ProgressResult::OnTrack));
    assert!(state
        .mail_log
        .iter()
        .any(|m| m.from == Role::Planner
            && m.to == Role::Executor
            && m.subject.contains("Progress check 1 of 3: on track")));
}

#[tokio::test]
async fn stuck_contract_escalates_when_the_check_budget_runs_out() {
    // The executor accepts and then never produces any output.
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", ""]);
    let engine = engine_with(
        model,
        EngineConfig::default().with_progress_checks(Duration::from_secs(30), 2),
    );

    let outcome = engine.run(ContractIntake::new("stalled task")).await.unwrap();

    let RunOutcome::Escalated(state) = outcome else {
        panic!("expected escalation");
    };
    assert!(state.escalated);
    // Each stuck check granted one more execution, up to the check budget.
    assert_eq!(state.progress.check_count, 2);
    assert_eq!(state.progress.last_result, Some(ProgressResult::Stuck));
    assert_eq!(state.attempt_count, 2);
    assert_eq!(executions(&state), 2);
    assert!(state.final_result.contains("no progress after repeated checks"));
}

#[tokio::test]
async fn scenario_human_rejection_after_resume_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let ledger = Arc::new(ApprovalLedger::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = EngineConfig::default().with_human_approver("alex", vec!["audit".to_string()]);

    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "the deliverable"])
        .say(Role::Reviewer, &["PASS\nfine work"]);
    let engine = Engine::new(
        config.clone(),
        Arc::new(model),
        notifier.clone(),
        checkpoints.clone(),
        ledger.clone(),
    );

    let outcome = engine.run(ContractIntake::new("sensitive change")).await.unwrap();
    let RunOutcome::Suspended {
        contract_id,
        request_id,
    } = outcome
    else {
        panic!("expected suspension");
    };

    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].approver_id, "alex");
    assert_eq!(sent[0].request_id, request_id);
    assert_eq!(sent[0].cc, vec!["audit".to_string()]);

    // A different engine instance sharing the stores handles the callback.
    let resumer = Engine::new(
        config,
        Arc::new(ScriptedModel::new()),
        Arc::new(RecordingNotifier::default()),
        checkpoints,
        ledger,
    );
    let outcome = resumer
        .resume(
            contract_id,
            ApprovalDecision {
                action: ApprovalAction::Reject,
                notes: Some("missing coverage".to_string()),
            },
        )
        .await
        .unwrap();

    let RunOutcome::Rejected(state) = outcome else {
        panic!("expected terminal rejection");
    };
    assert!(!state.approved);
    assert_eq!(state.phase, Phase::Rejected);
    assert_eq!(state.approval.status, Some(ApprovalStatus::Rejected));
    assert_eq!(
        state.approval.rejection_notes.as_deref(),
        Some("missing coverage")
    );
}

#[tokio::test]
async fn scenario_human_approval_after_resume_completes() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let ledger = Arc::new(ApprovalLedger::new());
    let config = EngineConfig::default().with_human_approver("alex", vec![]);

    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "the deliverable"])
        .say(Role::Reviewer, &["PASS\ngood"]);
    let engine = Engine::new(
        config,
        Arc::new(model),
        Arc::new(RecordingNotifier::default()),
        checkpoints,
        ledger,
    );

    let outcome = engine.run(ContractIntake::new("routine change")).await.unwrap();
    let RunOutcome::Suspended { contract_id, .. } = outcome else {
        panic!("expected suspension");
    };

    let outcome = engine
        .resume(
            contract_id,
            ApprovalDecision {
                action: ApprovalAction::Approve,
                notes: None,
            },
        )
        .await
        .unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    assert!(state.approved);
    assert_eq!(state.final_result, "the deliverable");
}

#[tokio::test]
async fn resume_works_in_a_process_that_shares_only_the_checkpoint_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default().with_human_approver("alex", vec![]);

    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "the deliverable"])
        .say(Role::Reviewer, &["PASS\ngood"]);
    let engine = Engine::new(
        config.clone(),
        Arc::new(model),
        Arc::new(RecordingNotifier::default()),
        Arc::new(FileCheckpointStore::new(dir.path()).unwrap()),
        Arc::new(ApprovalLedger::new()),
    );

    let outcome = engine.run(ContractIntake::new("sensitive change")).await.unwrap();
    let RunOutcome::Suspended { contract_id, .. } = outcome else {
        panic!("expected suspension");
    };
    drop(engine);

    // A second process: fresh ledger, its own view of the checkpoint dir.
    let resumer = Engine::new(
        config,
        Arc::new(ScriptedModel::new()),
        Arc::new(RecordingNotifier::default()),
        Arc::new(FileCheckpointStore::new(dir.path()).unwrap()),
        Arc::new(ApprovalLedger::new()),
    );
    let outcome = resumer
        .resume(
            contract_id,
            ApprovalDecision {
                action: ApprovalAction::Approve,
                notes: None,
            },
        )
        .await
        .unwrap();

    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    assert!(state.approved);
    assert_eq!(state.approval.status, Some(ApprovalStatus::Approved));
    assert_eq!(state.final_result, "the deliverable");
}

#[tokio::test]
async fn rejecting_without_notes_fails_and_leaves_the_contract_suspended() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let ledger = Arc::new(ApprovalLedger::new());
    let config = EngineConfig::default().with_human_approver("alex", vec![]);

    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(Role::Executor, &["ACCEPT", "work"])
        .say(Role::Reviewer, &["PASS\nok"]);
    let engine = Engine::new(
        config,
        Arc::new(model),
        Arc::new(RecordingNotifier::default()),
        checkpoints.clone(),
        ledger,
    );

    let RunOutcome::Suspended { contract_id, .. } =
        engine.run(ContractIntake::new("task")).await.unwrap()
    else {
        panic!("expected suspension");
    };

    let err = engine
        .resume(
            contract_id,
            ApprovalDecision {
                action: ApprovalAction::Reject,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("non-empty notes"));

    // Still suspended at the gate; a proper decision goes through.
    let state = checkpoints.load(contract_id).await.unwrap().unwrap();
    assert_eq!(state.phase, Phase::FinalApproval);
    let outcome = engine
        .resume(
            contract_id,
            ApprovalDecision {
                action: ApprovalAction::Approve,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn concurrency_limit_admits_contracts_in_submission_order() {
    let model = ScriptedModel::new()
        .say(Role::Planner, &["- one step"])
        .say(
            Role::Executor,
            &["ACCEPT", "done", "ACCEPT", "done", "ACCEPT", "done"],
        )
        .say(Role::Reviewer, &["PASS\nok"])
        .say(Role::Director, &["APPROVE"]);
    let model = Arc::new(model);
    let engine = Engine::new(
        EngineConfig::default().with_max_parallel(1),
        model.clone(),
        Arc::new(RecordingNotifier::default()),
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(ApprovalLedger::new()),
    );

    let outcomes = engine
        .run_batch(vec![
            ContractIntake::new("first task"),
            ContractIntake::new("second task"),
            ContractIntake::new("third task"),
        ])
        .await;
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, Ok(RunOutcome::Completed(_)))));

    let prompts = model.planner_prompts.lock().unwrap();
    assert_eq!(*prompts, vec!["first task", "second task", "third task"]);
}
