// tests/engine_execute.rs

use std::fs;
use std::sync::Arc;

use stagehand::config::{Settings, StageDefinition};
use stagehand::context::RunContext;
use stagehand::engine::{Engine, StageOutcome, ACCEPTED_MESSAGE};
use stagehand::errors::StagehandError;
use stagehand::fs::RealFileSystem;
use stagehand::remote::TaskStatus;
use stagehand::types::{DedupState, StageStatus};
use stagehand_test_utils::{
    init_tracing, FakeRemote, SettingsBuilder, SharedBuffer, StageBuilder, TestProject,
    ThreadBehaviour,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const ARCHIVE: &str = "python_project.zip";

/// `default` has no dependencies; `dependent` needs it.
fn default_and_dependent() -> Vec<StageDefinition> {
    vec![
        StageBuilder::new("default").runs_on("noop").build(),
        StageBuilder::new("dependent")
            .dep("default")
            .runs_on("noop")
            .build(),
    ]
}

fn engine(
    project: &TestProject,
    remote: &FakeRemote,
    stages: Vec<StageDefinition>,
) -> (Engine, SharedBuffer) {
    init_tracing();
    let out = SharedBuffer::default();
    let engine = Engine::new(project.context(stages, false), remote.services())
        .with_output(Box::new(out.clone()));
    (engine, out)
}

#[tokio::test]
async fn dependent_scenario_completes_with_one_upload() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, out) = engine(&project, &remote, default_and_dependent());

    let outcomes = engine.execute_sequence(&["dependent"], true).await?;

    assert_eq!(
        outcomes,
        vec![
            ("default".to_string(), StageOutcome::Completed),
            ("dependent".to_string(), StageOutcome::Completed),
        ]
    );

    let state = &engine.context().state;
    assert_eq!(state.status("default"), Some(StageStatus::Completed));
    assert_eq!(state.status("dependent"), Some(StageStatus::Completed));

    // Same project content: uploaded once, found the second time.
    assert_eq!(remote.calls().upload, 1);
    assert_eq!(remote.registrations().len(), 1);
    let first = &state.record("default").unwrap().artifacts[ARCHIVE];
    let second = &state.record("dependent").unwrap().artifacts[ARCHIVE];
    assert_eq!(first.state, DedupState::Uploaded);
    assert_eq!(second.state, DedupState::Found);
    assert_eq!(first.artifact_uri, second.artifact_uri);
    let objects = remote.object_names(engine.context().run_id());
    assert!(objects.contains(&format!("artifacts/{ARCHIVE}")));

    let shown = out.contents();
    assert!(shown.contains("default output from http://faas.test/noop"));
    assert!(shown.contains("dependent output from http://faas.test/noop"));
    Ok(())
}

#[tokio::test]
async fn completed_stage_makes_no_network_calls() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    engine.execute("default", true).await?;
    remote.reset_calls();

    let outcome = engine.execute("default", true).await?;

    assert_eq!(outcome, StageOutcome::Skipped);
    assert_eq!(remote.calls().total(), 0);
    Ok(())
}

#[tokio::test]
async fn job_carries_run_artifacts_and_directives() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let stages = vec![
        StageBuilder::new("style")
            .resource("flake8", "/piperci-flake8")
            .directive("flake8", &[("files", "src/*.py")])
            .directive("flake8", &[("files", "tests/*.py")])
            .build(),
    ];
    let (mut engine, _out) = engine(&project, &remote, stages);

    let outcome = engine.execute("style", false).await?;

    let submissions = remote.submissions();
    assert_eq!(submissions.len(), 1);
    let (url, job) = &submissions[0];
    assert_eq!(url, "http://faas.test/piperci-flake8");
    assert_eq!(job.stage, "style");
    assert_eq!(job.project, "python_project");
    assert_eq!(job.run_id, engine.context().run_id());
    assert_eq!(job.configs.len(), 2);
    assert_eq!(job.configs[1].params["files"], "tests/*.py");
    assert!(job.artifacts.contains_key(ARCHIVE));

    let record = engine.context().state.record("style").unwrap();
    assert_eq!(record.state, Some(StageStatus::Running));
    assert_eq!(job.task_id, record.client_task_id.clone().unwrap());
    assert_eq!(
        outcome,
        StageOutcome::Submitted {
            thread_ids: vec![record.thread_id.clone().unwrap()]
        }
    );

    let updates = remote.task_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1, TaskStatus::Info);
    assert_eq!(updates[0].2, ACCEPTED_MESSAGE);
    Ok(())
}

#[tokio::test]
async fn one_job_per_resource_in_first_appearance_order() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let stages = vec![
        StageBuilder::new("lint")
            .resource("pylint", "/pylint")
            .resource("flake8", "/flake8")
            .directive("flake8", &[("files", "a.py")])
            .directive("pylint", &[])
            .directive("flake8", &[("files", "b.py")])
            .build(),
    ];
    let (mut engine, _out) = engine(&project, &remote, stages);

    engine.execute("lint", false).await?;

    let urls: Vec<String> = remote.submissions().into_iter().map(|(u, _)| u).collect();
    assert_eq!(urls, vec!["http://faas.test/flake8", "http://faas.test/pylint"]);
    // The artifact is prepared once per stage, not once per resource.
    assert_eq!(remote.calls().exists, 1);
    Ok(())
}

#[tokio::test]
async fn unconfirmed_dependency_aborts_dependent() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new().with_threads(ThreadBehaviour::Pending);
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    engine.execute("default", false).await?;
    let err = engine.execute("dependent", false).await.unwrap_err();

    match err {
        StagehandError::DependenciesNotComplete { stage, deps } => {
            assert_eq!(stage, "dependent");
            assert_eq!(deps, vec!["default"]);
        }
        other => panic!("Expected DependenciesNotComplete, got: {:?}", other),
    }
    // Only `default` ever asked for a task id.
    assert_eq!(remote.calls().request_task, 1);
    assert!(engine.context().state.record("dependent").is_none());
    assert_eq!(
        engine.context().state.status("default"),
        Some(StageStatus::Running)
    );
    Ok(())
}

#[tokio::test]
async fn dependency_never_submitted_is_unresolved() {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    let err = engine.execute("dependent", false).await.unwrap_err();

    assert!(matches!(
        err,
        StagehandError::DependenciesNotComplete { ref deps, .. } if deps == &["default"]
    ));
    assert_eq!(remote.calls().total(), 0);
}

#[tokio::test]
async fn dependency_confirmed_by_poll_is_recorded_completed() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    engine.execute("default", false).await?;
    assert_eq!(
        engine.context().state.status("default"),
        Some(StageStatus::Running)
    );

    let outcome = engine.execute("dependent", false).await?;

    assert!(matches!(outcome, StageOutcome::Submitted { .. }));
    assert_eq!(
        engine.context().state.status("default"),
        Some(StageStatus::Completed)
    );
    Ok(())
}

#[tokio::test]
async fn failed_dependency_is_recorded_failed() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new().with_threads(ThreadBehaviour::Fail);
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    engine.execute("default", false).await?;
    let err = engine.execute("dependent", false).await.unwrap_err();

    assert!(matches!(err, StagehandError::DependenciesNotComplete { .. }));
    assert_eq!(
        engine.context().state.status("default"),
        Some(StageStatus::Failed)
    );
    Ok(())
}

#[tokio::test]
async fn rejected_submission_fails_stage_and_notifies_tracker() {
    let project = TestProject::new();
    let remote = FakeRemote::new().rejecting_submissions();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    let err = engine.execute("default", false).await.unwrap_err();

    match err {
        StagehandError::RemoteSubmission { stage, url, .. } => {
            assert_eq!(stage, "default");
            assert_eq!(url, "http://faas.test/noop");
        }
        other => panic!("Expected RemoteSubmission, got: {:?}", other),
    }
    assert_eq!(
        engine.context().state.status("default"),
        Some(StageStatus::Failed)
    );

    let updates = remote.task_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1, TaskStatus::Failed);
    assert!(updates[0].2.contains("Failed to call http://faas.test/noop gateway"));
}

#[tokio::test]
async fn remote_failure_while_waiting_carries_failed_events() {
    let project = TestProject::new();
    let remote = FakeRemote::new().with_threads(ThreadBehaviour::Fail);
    let (mut engine, out) = engine(&project, &remote, default_and_dependent());

    let err = engine.execute("default", true).await.unwrap_err();

    match err {
        StagehandError::RemoteTaskFailure { stage, events } => {
            assert_eq!(stage, "default");
            assert!(events.contains("flake8 exited with status 1"));
            assert!(!events.contains("job started"));
        }
        other => panic!("Expected RemoteTaskFailure, got: {:?}", other),
    }
    assert_eq!(
        engine.context().state.status("default"),
        Some(StageStatus::Failed)
    );
    assert!(out.contents().is_empty());
}

#[tokio::test]
async fn waiting_gives_up_after_retry_bound() {
    let project = TestProject::new();
    let remote = FakeRemote::new().with_threads(ThreadBehaviour::Pending);
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    let err = engine.execute("default", true).await.unwrap_err();

    assert!(matches!(
        err,
        StagehandError::RemoteTaskTimeout { attempts: 3, .. }
    ));
    assert_eq!(remote.calls().thread_events, 3);
}

#[tokio::test]
async fn missing_resource_fails_before_any_request() {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let stages = vec![
        StageBuilder::new("lint")
            .resource("flake8", "/flake8")
            .directive("pylint", &[])
            .build(),
    ];
    let (mut engine, _out) = engine(&project, &remote, stages);

    let err = engine.execute("lint", false).await.unwrap_err();

    assert!(matches!(
        err,
        StagehandError::ResourceResolution { ref resource, .. } if resource == "pylint"
    ));
    assert_eq!(remote.calls().total(), 0);
}

#[tokio::test]
async fn stage_without_directives_completes_after_artifact() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, vec![StageBuilder::new("package").build()]);

    let outcome = engine.execute("package", true).await?;

    assert_eq!(outcome, StageOutcome::Completed);
    assert_eq!(remote.calls().upload, 1);
    assert_eq!(remote.calls().submit, 0);
    Ok(())
}

#[tokio::test]
async fn unknown_stage_leaves_state_untouched() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());
    let before = fs::read_to_string(project.state_file())?;

    let err = engine.execute_sequence(&["ghost"], true).await.unwrap_err();

    assert!(matches!(err, StagehandError::UnknownStage(ref s) if s == "ghost"));
    assert_eq!(fs::read_to_string(project.state_file())?, before);
    assert_eq!(remote.calls().total(), 0);
    Ok(())
}

#[tokio::test]
async fn changed_project_is_uploaded_again() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    engine.execute("default", false).await?;
    project.write("src/app.py", "print('changed')\n");
    engine.execute("dependent", false).await?;

    assert_eq!(remote.calls().upload, 2);
    let state = &engine.context().state;
    assert_eq!(
        state.record("dependent").unwrap().artifacts[ARCHIVE].state,
        DedupState::Uploaded
    );
    Ok(())
}

/// `lint` posts one job to each of two resources; `unit` needs it.
fn two_resource_dependency() -> Vec<StageDefinition> {
    vec![
        StageBuilder::new("lint")
            .runs_on("pylint")
            .runs_on("flake8")
            .build(),
        StageBuilder::new("unit").dep("lint").runs_on("pytest").build(),
    ]
}

#[tokio::test]
async fn every_thread_of_a_dependency_must_complete() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, two_resource_dependency());

    let StageOutcome::Submitted { thread_ids } = engine.execute("lint", false).await? else {
        panic!("lint should have been submitted");
    };
    assert_eq!(thread_ids.len(), 2);
    assert_eq!(engine.context().state.record("lint").unwrap().thread_ids, thread_ids);

    // The first resource is still working, the last one is done.
    remote.set_thread(&thread_ids[0], ThreadBehaviour::Pending);
    remote.set_thread(&thread_ids[1], ThreadBehaviour::Complete);

    let err = engine.execute("unit", false).await.unwrap_err();

    assert!(matches!(
        err,
        StagehandError::DependenciesNotComplete { ref deps, .. } if deps == &["lint"]
    ));
    assert_eq!(
        engine.context().state.status("lint"),
        Some(StageStatus::Running)
    );
    assert!(engine.context().state.record("unit").is_none());

    remote.set_thread(&thread_ids[0], ThreadBehaviour::Complete);
    let outcome = engine.execute("unit", false).await?;
    assert!(matches!(outcome, StageOutcome::Submitted { .. }));
    assert_eq!(
        engine.context().state.status("lint"),
        Some(StageStatus::Completed)
    );
    Ok(())
}

#[tokio::test]
async fn rerun_forgets_threads_of_the_failed_attempt() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let (mut engine, _out) = engine(&project, &remote, two_resource_dependency());

    let StageOutcome::Submitted { thread_ids: first } = engine.execute("lint", false).await? else {
        panic!("lint should have been submitted");
    };
    // A remote failure seen while gating `unit` marks `lint` failed.
    remote.set_thread(&first[0], ThreadBehaviour::Fail);
    assert!(engine.execute("unit", false).await.is_err());
    assert_eq!(
        engine.context().state.status("lint"),
        Some(StageStatus::Failed)
    );

    let StageOutcome::Submitted { thread_ids: second } = engine.execute("lint", false).await? else {
        panic!("lint should have been resubmitted");
    };

    assert_ne!(first, second);
    let record = engine.context().state.record("lint").unwrap();
    assert_eq!(record.thread_ids, second);
    assert_eq!(record.thread_id.as_ref(), second.last());
    Ok(())
}

#[tokio::test]
async fn accepted_thread_is_recorded_even_if_tracker_update_fails() {
    let project = TestProject::new();
    let remote = FakeRemote::new().rejecting_task_updates();
    let (mut engine, _out) = engine(&project, &remote, default_and_dependent());

    let err = engine.execute("default", false).await.unwrap_err();

    assert!(matches!(err, StagehandError::TaskTracker(_)));
    let record = engine.context().state.record("default").unwrap();
    assert_eq!(record.state, Some(StageStatus::Running));
    assert_eq!(record.thread_id.as_deref(), Some("thread-2"));
    assert_eq!(record.thread_ids, vec!["thread-2".to_string()]);
}

/// Engine over custom settings, with payload echoing switched on.
fn debug_engine(
    project: &TestProject,
    remote: &FakeRemote,
    settings: Settings,
) -> Result<Engine, StagehandError> {
    init_tracing();
    let config = project.pipeline(settings, default_and_dependent());
    let ctx = RunContext::new(config, Arc::new(RealFileSystem), false, true)?;
    Ok(Engine::new(ctx, remote.services()).with_output(Box::new(SharedBuffer::default())))
}

#[tokio::test]
async fn waiting_honours_configured_retry_bound() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new().with_threads(ThreadBehaviour::Pending);
    let settings = SettingsBuilder::new()
        .project_root(project.root())
        .polling(5, 1)
        .build();
    let mut engine = debug_engine(&project, &remote, settings)?;

    let err = engine.execute("default", true).await.unwrap_err();

    assert!(matches!(
        err,
        StagehandError::RemoteTaskTimeout { attempts: 5, .. }
    ));
    assert_eq!(remote.calls().thread_events, 5);
    Ok(())
}

#[tokio::test]
async fn excluded_files_do_not_change_the_artifact() -> TestResult {
    let project = TestProject::new();
    let remote = FakeRemote::new();
    let settings = SettingsBuilder::new()
        .project_root(project.root())
        .project_name("webapp")
        .exclude("*.log")
        .build();
    let mut engine = debug_engine(&project, &remote, settings)?;

    engine.execute("default", false).await?;
    project.write("build/debug.log", "noise\n");
    engine.execute("dependent", false).await?;

    assert_eq!(remote.calls().upload, 1);
    let state = &engine.context().state;
    let record = &state.record("dependent").unwrap().artifacts["webapp.zip"];
    assert_eq!(record.state, DedupState::Found);
    let submitted = remote.submissions();
    assert!(submitted.iter().all(|(_, job)| job.project == "webapp"));
    Ok(())
}
