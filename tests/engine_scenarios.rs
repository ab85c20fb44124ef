//! Release engine scenarios against scripted git output.

use glrelease::engine::{EngineCommand, EngineSettings, ReleaseEngine};
use glrelease::error::{CodeHostError, EngineError, ReleaseError};
use glrelease::git::CliGitOperations;
use glrelease::history::{HistoryStatus, HistoryStore, record_for};
use glrelease::session::{
    Environment, LoadOutcome, LogOutcome, ReleaseRequest, ReleaseSession, ReleaseStep,
    SessionStatus, SessionStore, SuspendReason,
};
use glrelease::test_support::{
    RecordingCodeHost, Reply, ScriptedRunner, merge_request, release_request,
};
use std::sync::Arc;

type TestEngine = ReleaseEngine<CliGitOperations<Arc<ScriptedRunner>>, Arc<RecordingCodeHost>>;

const CONFLICT_OUTPUT: &str = "Auto-merging file.go\n\
CONFLICT (content): Merge conflict in file.go\n\
Automatic merge failed; fix conflicts and then commit the result.\n";

struct Harness {
    _data: tempfile::TempDir,
    repo: tempfile::TempDir,
    runner: Arc<ScriptedRunner>,
    host: Arc<RecordingCodeHost>,
    engine: TestEngine,
}

impl Harness {
    fn new() -> Self {
        let data = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        runner
            .on("rev-parse", &["HEAD"], Reply::ok("0123abcd\n"))
            .on("rev-parse", &["--abbrev-ref"], Reply::ok("feature/local\n"))
            .on("rev-parse", &["MERGE_HEAD"], Reply::fail(1, "", ""));
        let host = Arc::new(RecordingCodeHost::new());

        let engine = ReleaseEngine::new(
            CliGitOperations::new(Arc::clone(&runner), repo.path()),
            Arc::clone(&host),
            SessionStore::new(data.path()),
            HistoryStore::new(data.path()),
            EngineSettings::default(),
        );

        Self {
            _data: data,
            repo,
            runner,
            host,
            engine,
        }
    }

    fn merge_in_progress(&self) {
        self.runner
            .on("rev-parse", &["MERGE_HEAD"], Reply::ok("89abcdef\n"));
    }

    fn conflict_on(&self, branch: &str) {
        let source = format!("origin/{}", branch);
        self.runner
            .once("merge", &[source.as_str()], Reply::fail(1, CONFLICT_OUTPUT, ""))
            .once("diff", &["--diff-filter=U"], Reply::ok("file.go\n"));
    }
}

fn two_branch_release() -> ReleaseRequest {
    release_request(
        Environment::Prod,
        "1.2.0",
        vec![
            merge_request(11, "feature/a", "Add login"),
            merge_request(12, "feature/b", "Add payments"),
        ],
    )
}

fn stored(engine: &TestEngine) -> Option<ReleaseSession> {
    match engine.sessions().load().unwrap() {
        LoadOutcome::Resumable(session) | LoadOutcome::Terminal(session) => Some(session),
        LoadOutcome::None => None,
    }
}

#[tokio::test]
async fn conflict_suspends_and_retry_merges_only_the_failed_branch() {
    let h = Harness::new();
    h.conflict_on("feature/b");

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Suspended);
    assert_eq!(session.current_step, ReleaseStep::MergeBranch { index: 1 });
    assert_eq!(
        session.suspension,
        Some(SuspendReason::MergeConflict {
            branch: "feature/b".to_string(),
            paths: vec!["file.go".to_string()],
        })
    );
    assert_eq!(stored(&h.engine), Some(session.clone()));
    assert_eq!(h.runner.count("checkout", "-B release/prod-1.2.0 origin/master"), 1);

    // Operator resolved and committed the merge.
    h.engine
        .dispatch(&mut session, EngineCommand::Retry)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.current_step, ReleaseStep::ApplyExclusions);
    assert_eq!(
        session.log.last().map(|entry| &entry.outcome),
        Some(&LogOutcome::MergeOk)
    );

    h.engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("merge", "origin/feature/a"), 1);
    assert_eq!(h.runner.count("merge", "origin/feature/b"), 2);
}

#[tokio::test]
async fn retry_concludes_a_resolved_but_uncommitted_merge() {
    let h = Harness::new();
    h.conflict_on("feature/b");

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Suspended);

    h.merge_in_progress();
    h.engine.retry(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("commit", "--no-edit"), 1);
    assert_eq!(h.runner.count("merge", "origin/feature/a"), 1);
}

#[tokio::test]
async fn retry_with_unresolved_paths_suspends_again() {
    let h = Harness::new();
    h.conflict_on("feature/b");

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    h.merge_in_progress();
    h.runner
        .once("diff", &["--diff-filter=U"], Reply::ok("file.go\n"));
    h.engine.retry(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Suspended);
    assert_eq!(session.current_step, ReleaseStep::MergeBranch { index: 1 });
    assert_eq!(h.runner.count("commit", "--no-edit"), 0);
    assert_eq!(h.runner.count("merge", "origin/feature/b"), 1);
}

#[tokio::test]
async fn completed_release_is_archived_and_cleared() {
    let h = Harness::new();

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.current_step, ReleaseStep::Done);
    assert!(!h.engine.sessions().exists());

    let drafts = h.host.drafts();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].source_branch, "release/prod-1.2.0");
    assert_eq!(drafts[0].target_branch, "master");
    assert_eq!(drafts[0].title, "Release 1.2.0 (PROD)");
    assert_eq!(
        session.merge_request_url.as_deref(),
        Some("https://gitlab.example.com/projects/42/-/merge_requests/1")
    );

    let index = h.engine.history().load_index().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].id, session.id);
    assert_eq!(index[0].tag, "v1.2.0");
    assert_eq!(index[0].mr_count, 2);
    assert_eq!(index[0].status, HistoryStatus::Completed);

    let detail = h.engine.history().load_detail(&session.id).unwrap();
    assert_eq!(detail.log, session.log);
    assert_eq!(detail.merge_request_url, session.merge_request_url);
}

#[tokio::test]
async fn nothing_to_commit_advances_to_push() {
    let h = Harness::new();
    h.runner.on(
        "commit",
        &["-m"],
        Reply::fail(1, "On branch release/prod-1.2.0\nnothing to commit, working tree clean\n", ""),
    );

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.log.iter().any(|entry| {
        entry.step == ReleaseStep::Commit && entry.outcome == LogOutcome::NothingToCommit
    }));
    assert_eq!(h.runner.count("push", "release/prod-1.2.0"), 1);
}

#[tokio::test]
async fn absent_excluded_file_removes_nothing() {
    let h = Harness::new();
    let mut request = two_branch_release();
    request.exclude_patterns = vec![".gitlab-ci.yml".to_string()];

    let mut session = h.engine.start(request).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("rm", "--"), 0);
}

#[tokio::test]
async fn present_excluded_file_is_removed() {
    let h = Harness::new();
    std::fs::write(h.repo.path().join(".gitlab-ci.yml"), "stages: []\n").unwrap();
    std::fs::write(h.repo.path().join("main.go"), "package main\n").unwrap();
    h.runner
        .on("ls-files", &[".gitlab-ci.yml"], Reply::ok(".gitlab-ci.yml\0"));
    let mut request = two_branch_release();
    request.exclude_patterns = vec![".gitlab-ci.yml".to_string()];

    let mut session = h.engine.start(request).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("rm", ".gitlab-ci.yml"), 1);
    assert!(!h.repo.path().join(".gitlab-ci.yml").exists());
    assert!(h.repo.path().join("main.go").exists());
}

#[tokio::test]
async fn ignored_files_are_left_alone_by_exclusions() {
    let h = Harness::new();
    std::fs::create_dir(h.repo.path().join("target")).unwrap();
    std::fs::write(h.repo.path().join("target/build.log"), "built\n").unwrap();
    // git lists nothing: the log is ignored.
    h.runner.on("ls-files", &["target/build.log"], Reply::ok(""));
    let mut request = two_branch_release();
    request.exclude_patterns = vec!["**/*.log".to_string()];

    let mut session = h.engine.start(request).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("ls-files", "--exclude-standard"), 1);
    assert_eq!(h.runner.count("rm", "--"), 0);
    assert!(h.repo.path().join("target/build.log").exists());
}

#[tokio::test]
async fn rejected_push_suspends_without_force() {
    let h = Harness::new();
    h.runner.once(
        "push",
        &["-u"],
        Reply::fail(
            1,
            "",
            "To gitlab.example.com:group/app.git\n \
! [rejected]        release/prod-1.2.0 -> release/prod-1.2.0 (fetch first)\n\
error: failed to push some refs to 'gitlab.example.com:group/app.git'\n",
        ),
    );

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Suspended);
    assert_eq!(session.current_step, ReleaseStep::Push);
    match &session.suspension {
        Some(SuspendReason::PushRejected { reason }) => assert!(reason.contains("[rejected]")),
        other => panic!("unexpected suspension {:?}", other),
    }

    h.engine.retry(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("push", "-u"), 2);
    assert!(h.runner.calls().iter().all(|call| !call.contains("--force")));
}

#[tokio::test]
async fn code_host_failure_suspends_and_retry_creates_the_merge_request() {
    let h = Harness::new();
    h.host.fail_next(CodeHostError::Api {
        status: 500,
        body: "internal error".to_string(),
    });

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Suspended);
    assert_eq!(session.current_step, ReleaseStep::CreateRemoteMr);
    assert!(matches!(
        session.suspension,
        Some(SuspendReason::RemoteMergeRequest { .. })
    ));
    assert_eq!(session.merge_request_url, None);

    h.engine.retry(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.host.drafts().len(), 2);
    assert_eq!(h.runner.count("push", "-u"), 1);
}

#[tokio::test]
async fn existing_merge_request_is_adopted_after_a_conflict_response() {
    let h = Harness::new();
    h.host.fail_next(CodeHostError::Api {
        status: 409,
        body: r#"{"message":["Another open merge request already exists for this source branch: !31"]}"#
            .to_string(),
    });
    h.host
        .set_open_merge_request("https://gitlab.example.com/projects/42/-/merge_requests/31");

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(h.host.drafts().len(), 1);
    assert_eq!(h.host.lookups(), 1);
    let index = h.engine.history().load_index().unwrap();
    let detail = h.engine.history().load_detail(&index[0].id).unwrap();
    assert_eq!(
        detail.merge_request_url.as_deref(),
        Some("https://gitlab.example.com/projects/42/-/merge_requests/31")
    );
}

#[tokio::test]
async fn conflict_response_without_an_open_merge_request_suspends() {
    let h = Harness::new();
    h.host.fail_next(CodeHostError::Api {
        status: 409,
        body: "conflict".to_string(),
    });

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Suspended);
    assert_eq!(session.current_step, ReleaseStep::CreateRemoteMr);
    assert_eq!(h.host.lookups(), 1);
    assert!(matches!(
        &session.suspension,
        Some(SuspendReason::RemoteMergeRequest { error }) if error.contains("409")
    ));
}

#[tokio::test]
async fn dirty_tree_fails_init_and_abort_touches_nothing() {
    let h = Harness::new();
    h.runner
        .on("status", &["--porcelain"], Reply::ok(" M main.go\n?? notes.md\n"));

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.current_step, ReleaseStep::Init);
    assert_eq!(session.pre_release_commit, None);
    assert!(
        session
            .failure
            .as_deref()
            .unwrap_or_default()
            .contains("2 local change(s)")
    );

    let report = h
        .engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(session.status, SessionStatus::Aborted);
    assert_eq!(h.runner.count("reset", "--hard"), 0);
    assert!(!h.engine.sessions().exists());
}

#[tokio::test]
async fn abort_from_every_non_terminal_state() {
    // Active before any step ran.
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Aborted);
    assert!(h.runner.calls().is_empty());
    assert!(!h.engine.sessions().exists());

    // Active part-way through.
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();
    for _ in 0..4 {
        h.engine
            .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
            .await
            .unwrap();
    }
    assert_eq!(session.current_step, ReleaseStep::MergeBranch { index: 1 });
    h.engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Aborted);
    assert_eq!(h.runner.count("reset", "--hard 0123abcd"), 1);
    assert_eq!(h.runner.count("branch", "-D release/prod-1.2.0"), 1);
    assert!(!h.engine.sessions().exists());

    // Suspended on a conflict with the merge still pending.
    let h = Harness::new();
    h.conflict_on("feature/b");
    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Suspended);
    h.merge_in_progress();
    h.engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Aborted);
    assert_eq!(h.runner.count("merge", "--abort"), 1);
    assert_eq!(h.runner.count("clean", "-fd"), 1);
    assert_eq!(h.runner.count("checkout", "feature/local"), 1);
    assert!(!h.engine.sessions().exists());

    // Failed on a git error.
    let h = Harness::new();
    h.runner
        .on("fetch", &["origin"], Reply::fail(128, "", "fatal: unable to access remote\n"));
    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.current_step, ReleaseStep::CheckoutRoot);
    h.engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Aborted);
    assert_eq!(h.runner.count("branch", "-D"), 0);
    assert!(!h.engine.sessions().exists());

    let index = h.engine.history().load_index().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].status, HistoryStatus::Aborted);
}

#[tokio::test]
async fn failed_reset_is_reported_but_abort_completes() {
    let h = Harness::new();
    h.conflict_on("feature/b");
    h.runner.once(
        "reset",
        &["--hard"],
        Reply::fail(128, "", "fatal: Could not reset index file to revision '0123abcd'.\n"),
    );

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    let report = h
        .engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.is_clean());
    assert!(report.unrecoverable[0].contains("reset --hard"));
    assert_eq!(session.status, SessionStatus::Aborted);
    assert!(session.log.iter().any(|entry| {
        matches!(entry.outcome, LogOutcome::UnrecoverableState { .. })
    }));
    assert!(!h.engine.sessions().exists());
}

#[tokio::test]
async fn abort_leaves_the_root_branch_before_resetting() {
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();
    for _ in 0..2 {
        h.engine
            .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
            .await
            .unwrap();
    }
    assert_eq!(session.current_step, ReleaseStep::CreateReleaseBranch);

    h.engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();

    let calls = h.runner.calls();
    let position = |needle: &str| calls.iter().position(|call| call.contains(needle)).unwrap();
    assert!(position("git checkout -f feature/local") < position("git reset --hard 0123abcd"));
    assert_eq!(session.status, SessionStatus::Aborted);
}

#[tokio::test]
async fn abort_from_a_detached_head_detaches_at_the_starting_commit() {
    let h = Harness::new();
    h.runner
        .on("rev-parse", &["--abbrev-ref"], Reply::ok("HEAD\n"));
    let mut session = h.engine.start(two_branch_release()).unwrap();
    for _ in 0..3 {
        h.engine
            .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
            .await
            .unwrap();
    }

    let report = h
        .engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap()
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(h.runner.count("checkout", "--detach 0123abcd"), 1);
    assert_eq!(h.runner.count("branch", "-D release/prod-1.2.0"), 1);
}

#[tokio::test]
async fn failed_restore_skips_the_reset() {
    let h = Harness::new();
    h.conflict_on("feature/b");
    h.runner.on(
        "checkout",
        &["-f", "feature/local"],
        Reply::fail(1, "", "error: pathspec 'feature/local' did not match any file(s) known to git\n"),
    );

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    let report = h
        .engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap()
        .unwrap();

    assert!(report.unrecoverable[0].contains("checkout -f feature/local"));
    assert_eq!(h.runner.count("reset", "--hard"), 0);
    assert_eq!(h.runner.count("clean", "-fd"), 0);
    assert_eq!(h.runner.count("branch", "-D"), 0);
    assert_eq!(session.status, SessionStatus::Aborted);
}

#[tokio::test]
async fn abort_that_cannot_be_stored_still_reports_cleanup() {
    let h = Harness::new();
    h.conflict_on("feature/b");
    h.runner.once(
        "reset",
        &["--hard"],
        Reply::fail(128, "", "fatal: Could not reset index file to revision '0123abcd'.\n"),
    );

    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Suspended);

    let path = h.engine.sessions().path().to_path_buf();
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let err = h
        .engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap_err();

    match &err {
        ReleaseError::Engine(EngineError::AbortNotRecorded { unrecoverable, .. }) => {
            assert_eq!(unrecoverable.len(), 1);
            assert!(unrecoverable[0].contains("reset --hard"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(
        err.recovery_suggestions()
            .iter()
            .any(|s| s.starts_with("Manual cleanup required") && s.contains("reset --hard"))
    );
    assert_eq!(session.status, SessionStatus::Suspended);
    assert!(h.engine.history().load_index().unwrap().is_empty());
}

#[tokio::test]
async fn commands_not_allowed_in_the_current_state_are_rejected() {
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();

    let retry = h.engine.dispatch(&mut session, EngineCommand::Retry).await;
    assert!(matches!(
        retry,
        Err(ReleaseError::Engine(EngineError::InvalidCommand { status: SessionStatus::Active, .. }))
    ));

    h.runner
        .once("push", &["-u"], Reply::fail(1, "", " ! [rejected] x -> x (non-fast-forward)\n"));
    h.engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Suspended);

    let advance = h
        .engine
        .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
        .await;
    assert!(matches!(
        advance,
        Err(ReleaseError::Engine(EngineError::InvalidCommand { status: SessionStatus::Suspended, .. }))
    ));

    h.engine.retry(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    let abort = h.engine.dispatch(&mut session, EngineCommand::Abort).await;
    assert!(matches!(
        abort,
        Err(ReleaseError::Engine(EngineError::InvalidCommand { .. }))
    ));
}

#[tokio::test]
async fn only_one_session_at_a_time() {
    let h = Harness::new();
    let first = h.engine.start(two_branch_release()).unwrap();

    let second = h.engine.start(two_branch_release());
    match second {
        Err(ReleaseError::Engine(EngineError::SessionInProgress { id, .. })) => {
            assert_eq!(id, first.id)
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn interrupted_step_is_resumed_as_suspended() {
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();
    session.current_step = ReleaseStep::Push;
    session.in_flight = Some(ReleaseStep::Push);
    h.engine.sessions().save(&session).unwrap();

    let resumed = match h.engine.resume().unwrap() {
        LoadOutcome::Resumable(resumed) => resumed,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(resumed.status, SessionStatus::Suspended);
    assert_eq!(resumed.in_flight, None);
    assert_eq!(
        resumed.suspension,
        Some(SuspendReason::Interrupted {
            step: ReleaseStep::Push
        })
    );
    assert_eq!(stored(&h.engine), Some(resumed.clone()));

    let mut resumed = resumed;
    h.engine.retry(&mut resumed).await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Completed);
    assert_eq!(h.runner.count("push", "-u"), 1);
}

#[tokio::test]
async fn session_store_round_trip_preserves_every_field() {
    let h = Harness::new();
    h.conflict_on("feature/b");
    let mut session = h.engine.start(two_branch_release()).unwrap();
    h.engine.run(&mut session).await.unwrap();

    let loaded = match h.engine.sessions().load().unwrap() {
        LoadOutcome::Resumable(loaded) => loaded,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(loaded, session);
    assert!(!loaded.log.is_empty());
}

#[tokio::test]
async fn repeated_completion_does_not_duplicate_history() {
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();
    session.status = SessionStatus::Aborted;
    h.engine.sessions().save(&session).unwrap();

    // Crash after the history append, before the session file was removed.
    let (entry, detail) = record_for(&session, Default::default()).unwrap();
    h.engine.history().append(&entry, &detail).unwrap();
    assert!(h.engine.sessions().exists());

    assert!(matches!(
        h.engine.resume().unwrap(),
        LoadOutcome::Terminal(_)
    ));
    h.engine.finalize(&session).unwrap();
    h.engine.finalize(&session).unwrap();

    assert!(!h.engine.sessions().exists());
    let index = h.engine.history().load_index().unwrap();
    assert_eq!(index.len(), 1);
    assert!(h.engine.history().load_detail(&index[0].id).is_ok());

    // A new release can start once the old one is archived.
    assert!(h.engine.start(two_branch_release()).is_ok());
}

#[tokio::test]
async fn failed_save_leaves_the_session_on_its_step() {
    let h = Harness::new();
    let mut session = h.engine.start(two_branch_release()).unwrap();

    let path = h.engine.sessions().path().to_path_buf();
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let result = h
        .engine
        .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
        .await;
    assert!(result.is_err());
    assert_eq!(session.current_step, ReleaseStep::Init);
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.in_flight, None);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn non_production_release_uses_its_root_branch_and_tag() {
    let h = Harness::new();
    let request = release_request(
        Environment::Stage,
        "2.0.1",
        vec![merge_request(5, "feature/search", "Search")],
    );

    let mut session = h.engine.start(request).unwrap();
    h.engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.release_branch, "release/stage-2.0.1");
    assert_eq!(h.runner.count("checkout", "stable"), 2);
    assert_eq!(h.host.drafts()[0].target_branch, "stable");
    assert_eq!(h.engine.history().load_index().unwrap()[0].tag, "v2.0.1-stage");
}
