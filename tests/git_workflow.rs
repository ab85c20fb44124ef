//! End-to-end release runs against real git repositories.
//!
//! Each test builds a bare "remote" and a working clone in a temp directory.
//! Tests return early when no git binary is installed.

use glrelease::engine::{EngineCommand, EngineSettings, ReleaseEngine};
use glrelease::git::{CliGitOperations, ProcessRunner};
use glrelease::history::HistoryStore;
use glrelease::session::{Environment, ReleaseStep, SessionStatus, SessionStore, SuspendReason};
use glrelease::test_support::{RecordingCodeHost, merge_request, release_request};
use std::path::{Path, PathBuf};
use std::process::Command;

struct Fixture {
    _root: tempfile::TempDir,
    remote: PathBuf,
    work: PathBuf,
    data: PathBuf,
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(work: &Path, path: &str, contents: &str, message: &str) {
    std::fs::write(work.join(path), contents).unwrap();
    git(work, &["add", path]);
    git(work, &["commit", "-q", "-m", message]);
}

/// `master` with `file.go` and `.gitlab-ci.yml`; `feature/a` and
/// `feature/b` both rewrite `file.go`, so merging both conflicts.
fn fixture() -> Option<Fixture> {
    if which::which("git").is_err() {
        eprintln!("git not installed; skipping");
        return None;
    }

    let root = tempfile::tempdir().unwrap();
    let remote = root.path().join("remote.git");
    let work = root.path().join("work");
    let data = root.path().join("data");

    git(root.path(), &["init", "-q", "--bare", "remote.git"]);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(root.path(), &["init", "-q", "work"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(&work, &["config", "user.name", "Release Bot"]);
    git(&work, &["config", "user.email", "release@example.com"]);
    git(&work, &["config", "commit.gpgsign", "false"]);
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);

    commit_file(&work, "file.go", "package main\n\nconst name = \"base\"\n", "Initial commit");
    commit_file(&work, ".gitlab-ci.yml", "stages: [test]\n", "Add CI");
    git(&work, &["push", "-q", "origin", "master"]);

    for (branch, name, extra) in [("feature/a", "alpha", "a.go"), ("feature/b", "beta", "b.go")] {
        git(&work, &["checkout", "-q", "-b", branch, "master"]);
        commit_file(&work, extra, "package main\n", &format!("Add {}", extra));
        commit_file(
            &work,
            "file.go",
            &format!("package main\n\nconst name = \"{}\"\n", name),
            &format!("Rename to {}", name),
        );
        git(&work, &["push", "-q", "origin", branch]);
        git(&work, &["checkout", "-q", "master"]);
    }

    Some(Fixture {
        _root: root,
        remote,
        work,
        data,
    })
}

async fn engine(
    fixture: &Fixture,
) -> ReleaseEngine<CliGitOperations<ProcessRunner>, RecordingCodeHost> {
    let git = CliGitOperations::open(ProcessRunner::new(), &fixture.work, "git")
        .await
        .unwrap();
    ReleaseEngine::new(
        git,
        RecordingCodeHost::new(),
        SessionStore::new(&fixture.data),
        HistoryStore::new(&fixture.data),
        EngineSettings::default(),
    )
}

fn request() -> glrelease::session::ReleaseRequest {
    let mut request = release_request(
        Environment::Prod,
        "1.2.0",
        vec![
            merge_request(1, "feature/a", "Alpha"),
            merge_request(2, "feature/b", "Beta"),
        ],
    );
    request.exclude_patterns = vec![".gitlab-ci.yml".to_string()];
    request
}

#[tokio::test]
async fn conflict_resolution_and_completion() {
    let Some(fixture) = fixture() else { return };
    let engine = engine(&fixture).await;

    let mut session = engine.start(request()).unwrap();
    engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Suspended);
    assert_eq!(session.current_step, ReleaseStep::MergeBranch { index: 1 });
    assert_eq!(
        session.suspension,
        Some(SuspendReason::MergeConflict {
            branch: "feature/b".to_string(),
            paths: vec!["file.go".to_string()],
        })
    );

    // Resolve and stage, but leave the merge for the engine to conclude.
    std::fs::write(
        fixture.work.join("file.go"),
        "package main\n\nconst name = \"alpha-beta\"\n",
    )
    .unwrap();
    git(&fixture.work, &["add", "file.go"]);

    engine.retry(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed, "{:?}", session.failure);
    assert!(!engine.sessions().exists());

    let files = git(
        &fixture.remote,
        &["ls-tree", "-r", "--name-only", "release/prod-1.2.0"],
    );
    let files: Vec<&str> = files.lines().collect();
    assert_eq!(files, vec!["a.go", "b.go", "file.go"]);
    assert_eq!(
        git(&fixture.remote, &["show", "release/prod-1.2.0:file.go"]),
        "package main\n\nconst name = \"alpha-beta\""
    );
    assert!(
        git(&fixture.remote, &["log", "-1", "--format=%s", "release/prod-1.2.0"])
            .starts_with("Release 1.2.0 to PROD (master)")
    );

    let index = engine.history().load_index().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].tag, "v1.2.0");
}

#[tokio::test]
async fn abort_restores_the_starting_point() {
    let Some(fixture) = fixture() else { return };
    let engine = engine(&fixture).await;
    let before = git(&fixture.work, &["rev-parse", "HEAD"]);

    let mut session = engine.start(request()).unwrap();
    engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Suspended);

    let report = engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap()
        .unwrap();

    assert!(report.is_clean(), "{:?}", report.unrecoverable);
    assert_eq!(session.status, SessionStatus::Aborted);
    assert_eq!(git(&fixture.work, &["rev-parse", "--abbrev-ref", "HEAD"]), "master");
    assert_eq!(git(&fixture.work, &["rev-parse", "HEAD"]), before);
    assert_eq!(git(&fixture.work, &["status", "--porcelain"]), "");
    assert_eq!(git(&fixture.work, &["branch", "--list", "release/*"]), "");
    assert!(!engine.sessions().exists());
}

#[tokio::test]
async fn dirty_working_tree_is_refused() {
    let Some(fixture) = fixture() else { return };
    let engine = engine(&fixture).await;
    std::fs::write(fixture.work.join("scratch.txt"), "notes\n").unwrap();

    let mut session = engine.start(request()).unwrap();
    engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.current_step, ReleaseStep::Init);

    engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();
    assert!(fixture.work.join("scratch.txt").exists());
}

/// Every local branch with the commit it points at
fn local_refs(work: &Path) -> String {
    git(
        work,
        &["for-each-ref", "--format=%(refname) %(objectname)", "refs/heads"],
    )
}

#[tokio::test]
async fn abort_at_any_step_leaves_every_local_branch_unchanged() {
    let Some(fixture) = fixture() else { return };
    git(&fixture.work, &["checkout", "-q", "-b", "topic", "master"]);
    commit_file(&fixture.work, "topic.txt", "work in progress\n", "Topic work");
    let engine = engine(&fixture).await;

    let refs_before = local_refs(&fixture.work);
    let head_before = git(&fixture.work, &["rev-parse", "HEAD"]);

    // Abort after Init, CheckoutRoot, CreateReleaseBranch and the first merge.
    for steps in 1..=4 {
        let mut session = engine.start(request()).unwrap();
        for _ in 0..steps {
            engine
                .dispatch(&mut session, EngineCommand::AdvanceOnSuccess)
                .await
                .unwrap();
        }
        assert_eq!(session.status, SessionStatus::Active, "after {} step(s)", steps);

        let report = engine
            .dispatch(&mut session, EngineCommand::Abort)
            .await
            .unwrap()
            .unwrap();

        assert!(report.is_clean(), "{:?}", report.unrecoverable);
        assert_eq!(local_refs(&fixture.work), refs_before, "after {} step(s)", steps);
        assert_eq!(git(&fixture.work, &["rev-parse", "--abbrev-ref", "HEAD"]), "topic");
        assert_eq!(git(&fixture.work, &["rev-parse", "HEAD"]), head_before);
        assert_eq!(git(&fixture.work, &["status", "--porcelain"]), "");
    }

    // Abort while suspended on the conflict, with the merge still pending.
    let mut session = engine.start(request()).unwrap();
    engine.run(&mut session).await.unwrap();
    assert_eq!(session.status, SessionStatus::Suspended);
    engine
        .dispatch(&mut session, EngineCommand::Abort)
        .await
        .unwrap();
    assert_eq!(local_refs(&fixture.work), refs_before);
    assert_eq!(git(&fixture.work, &["rev-parse", "--abbrev-ref", "HEAD"]), "topic");
    assert!(fixture.work.join("topic.txt").exists());
    assert_eq!(engine.history().load_index().unwrap().len(), 5);
}

#[tokio::test]
async fn ignored_files_survive_exclusions() {
    let Some(fixture) = fixture() else { return };
    std::fs::create_dir_all(fixture.work.join(".git/info")).unwrap();
    std::fs::write(fixture.work.join(".git/info/exclude"), "*.log\n").unwrap();
    std::fs::write(fixture.work.join("debug.log"), "local notes\n").unwrap();
    let engine = engine(&fixture).await;

    let mut request = release_request(
        Environment::Prod,
        "1.3.0",
        vec![merge_request(1, "feature/a", "Alpha")],
    );
    request.exclude_patterns = vec!["*.log".to_string(), ".gitlab-ci.yml".to_string()];

    let mut session = engine.start(request).unwrap();
    engine.run(&mut session).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed, "{:?}", session.failure);
    assert!(fixture.work.join("debug.log").exists());
    let files = git(
        &fixture.remote,
        &["ls-tree", "-r", "--name-only", "release/prod-1.3.0"],
    );
    assert_eq!(files.lines().collect::<Vec<_>>(), vec!["a.go", "file.go"]);
}
