//! Hotfix, release and feature branch runs gated on their pull request.

mod common;

use branchflow_core::fakes::FakeForge;
use branchflow_core::{FlowError, Mode, ReviewState, RunOutcome, WorkflowEvent};
use common::{config, config_with_ci, harness, Repo};

fn push(branch: &str) -> WorkflowEvent {
    WorkflowEvent::push(format!("refs/heads/{branch}"))
}

/// `env/prod` at 1.2.0 and `hotfix/foo` on top of it declaring `version`.
fn hotfix_repo(version: &str) -> Repo {
    let repo = Repo::new("1.2.0");
    repo.branch("env/prod");
    repo.git(&["checkout", "--quiet", "-b", "hotfix/foo"]);
    repo.set_version(version);
    repo.push("hotfix/foo");
    repo
}

#[tokio::test]
async fn hotfix_without_pull_request_fails() {
    let repo = hotfix_repo("1.2.1");
    let h = harness(&repo, config()).await;

    let err = h.runner.run(&push("hotfix/foo")).await.unwrap_err();
    assert!(err.is_no_pull_request());
    assert_eq!(
        err.to_string(),
        "The branch hotfix/foo has no pull requests open yet, so it is not possible to run this workflow."
    );
    assert!(h.docker.calls().is_empty());
}

#[tokio::test]
async fn hotfix_publishes_pre_release_image_and_approves() {
    let repo = hotfix_repo("1.2.1");
    let h = harness(&repo, config_with_ci(&["touch ci-ran"])).await;
    let number = h.forge.add_pull_request("hotfix/foo", "env/prod", "octocat");

    let outcome = h.runner.run(&push("hotfix/foo")).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            mode: Mode::Hotfix,
            branch: "hotfix/foo".to_string()
        }
    );

    assert_eq!(h.docker.builds(), vec!["v1.2.1-pre".to_string()]);
    assert_eq!(h.docker.pushes(), vec!["v1.2.1-pre".to_string()]);
    assert_eq!(repo.remote_ref("refs/tags/v1.2.1"), None);
    assert!(repo.dir().join("ci-ran").exists());

    let reviews = h.forge.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].number, number);
    assert_eq!(reviews[0].state, ReviewState::Approve);
    assert!(reviews[0].body.contains("ghcr.io/acme/app:v1.2.1-pre"));
}

#[tokio::test]
async fn hotfix_must_bump_the_version() {
    let repo = Repo::new("1.2.0");
    repo.branch("env/prod");
    repo.git(&["checkout", "--quiet", "-b", "hotfix/foo"]);
    repo.commit_file("fix.txt", "patched\n");
    repo.push("hotfix/foo");
    let h = harness(&repo, config()).await;
    h.forge.add_pull_request("hotfix/foo", "env/prod", "octocat");

    let err = h.runner.run(&push("hotfix/foo")).await.unwrap_err();
    assert!(matches!(err, FlowError::PolicyViolation(_)));
    assert_eq!(
        err.to_string(),
        "Version 1.2.0 of hotfix/foo is the same as on env/prod"
    );
    assert_eq!(h.forge.reviews()[0].state, ReviewState::RequestChanges);
    assert!(h.docker.builds().is_empty());
}

#[tokio::test]
async fn hotfix_for_an_existing_tag_is_rejected() {
    let repo = hotfix_repo("1.2.1");
    repo.git(&["tag", "v1.2.1", "env/prod"]);
    repo.git(&["push", "--quiet", "origin", "refs/tags/v1.2.1"]);
    repo.git(&["tag", "-d", "v1.2.1"]);
    let h = harness(&repo, config()).await;
    h.forge.add_pull_request("hotfix/foo", "env/prod", "octocat");

    let err = h.runner.run(&push("hotfix/foo")).await.unwrap_err();
    assert_eq!(err.to_string(), "Tag v1.2.1 already exists");
    assert!(h.docker.builds().is_empty());
}

#[tokio::test]
async fn hotfix_must_descend_from_its_base() {
    let repo = hotfix_repo("1.2.1");
    repo.checkout("env/prod");
    repo.commit_file("prod-only.txt", "diverged\n");
    repo.push("env/prod");
    repo.checkout("hotfix/foo");
    let h = harness(&repo, config()).await;
    let number = h.forge.add_pull_request("hotfix/foo", "env/prod", "octocat");

    let err = h.runner.run(&push("hotfix/foo")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Branch hotfix/foo is not a descendant of env/prod"
    );
    let reviews = h.forge.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].number, number);
    assert_eq!(reviews[0].state, ReviewState::RequestChanges);
    assert!(reviews[0]
        .body
        .starts_with("Branch hotfix/foo is not a descendant of env/prod. "));
    assert!(h.docker.builds().is_empty());
}

#[tokio::test]
async fn tag_created_during_build_aborts_before_push() {
    let repo = hotfix_repo("1.2.1");
    let h = harness(&repo, config()).await;
    h.forge.add_pull_request("hotfix/foo", "env/prod", "octocat");

    let origin = repo.origin.path().to_path_buf();
    let racer = repo.git(&["rev-parse", "env/prod"]);
    h.docker.on_build(move |_| {
        common::run_git(&origin, &["update-ref", "refs/tags/v1.2.1", &racer]);
    });

    let err = h.runner.run(&push("hotfix/foo")).await.unwrap_err();
    assert!(matches!(err, FlowError::TagCreated { .. }));
    assert!(err.is_race());
    assert_eq!(err.to_string(), "Tag v1.2.1 has been created, aborting");
    assert_eq!(h.docker.builds(), vec!["v1.2.1-pre".to_string()]);
    assert!(h.docker.pushes().is_empty());

    let reviews = h.forge.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].state, ReviewState::RequestChanges);
}

#[tokio::test]
async fn release_against_develop_is_rejected() {
    let repo = Repo::new("1.2.0");
    repo.git(&["checkout", "--quiet", "-b", "release/1.3.0"]);
    repo.set_version("1.3.0");
    repo.push("release/1.3.0");
    let h = harness(&repo, config()).await;
    let number = h.forge.add_pull_request("release/1.3.0", "develop", "octocat");

    let err = h.runner.run(&push("release/1.3.0")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Pull request from release/ branch made against develop"
    );
    let reviews = h.forge.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].number, number);
    assert_eq!(reviews[0].state, ReviewState::RequestChanges);
    assert!(reviews[0].body.contains("env/staging"));
}

#[tokio::test]
async fn release_into_staging_publishes_pre_release_image() {
    let repo = Repo::new("1.2.0");
    repo.branch("env/staging");
    repo.git(&["checkout", "--quiet", "-b", "release/1.3.0"]);
    repo.set_version("1.3.0");
    repo.push("release/1.3.0");
    let h = harness(&repo, config()).await;
    h.forge
        .add_pull_request("release/1.3.0", "env/staging", "octocat");

    h.runner.run(&push("release/1.3.0")).await.unwrap();
    assert_eq!(h.docker.pushes(), vec!["v1.3.0-pre".to_string()]);
    assert_eq!(h.forge.reviews()[0].state, ReviewState::Approve);
}

#[tokio::test]
async fn several_open_pull_requests_are_ambiguous() {
    let repo = Repo::new("1.2.0");
    repo.branch("feature/login");
    let h = harness(&repo, config()).await;
    h.forge.add_pull_request("feature/login", "develop", "octocat");
    h.forge.add_pull_request("feature/login", "env/dev", "octocat");

    let err = h.runner.run(&push("feature/login")).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::TooManyPullRequests { count: 2, .. }
    ));
}

#[tokio::test]
async fn feature_branch_runs_ci_and_approves() {
    let repo = Repo::new("1.2.0");
    repo.branch("feature/login");
    let h = harness(&repo, config_with_ci(&["touch ci-ran"])).await;
    h.forge.add_pull_request("feature/login", "develop", "octocat");

    let outcome = h.runner.run(&push("feature/login")).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            mode: Mode::Other,
            branch: "feature/login".to_string()
        }
    );
    assert!(repo.dir().join("ci-ran").exists());
    assert_eq!(h.forge.reviews()[0].state, ReviewState::Approve);
    assert!(h.docker.calls().is_empty());
}

#[tokio::test]
async fn feature_branch_into_production_is_rejected() {
    let repo = Repo::new("1.2.0");
    repo.branch("feature/login");
    let h = harness(&repo, config_with_ci(&["touch ci-ran"])).await;
    h.forge.add_pull_request("feature/login", "env/prod", "octocat");

    let err = h.runner.run(&push("feature/login")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Pull request from feature/login made against env/prod"
    );
    assert!(!repo.dir().join("ci-ran").exists());
    assert_eq!(h.forge.reviews()[0].state, ReviewState::RequestChanges);
}

#[tokio::test]
async fn mergeback_branch_may_target_staging() {
    let repo = Repo::new("1.2.0");
    repo.branch("mergeback/prod/1.2.0");
    let h = harness(&repo, config()).await;
    h.forge
        .add_pull_request("mergeback/prod/1.2.0", "env/staging", FakeForge::BOT_LOGIN);

    h.runner.run(&push("mergeback/prod/1.2.0")).await.unwrap();

    // Bot-authored pull requests get a comment instead of a review.
    assert!(h.forge.reviews().is_empty());
    assert_eq!(h.forge.comments().len(), 1);
}

#[tokio::test]
async fn ignored_authors_get_no_feedback() {
    let repo = Repo::new("1.2.0");
    repo.branch("deps/bump-serde");
    let h = harness(&repo, config()).await;
    h.forge
        .add_pull_request("deps/bump-serde", "develop", "dependabot[bot]");

    h.runner.run(&push("deps/bump-serde")).await.unwrap();
    assert!(h.forge.reviews().is_empty());
    assert!(h.forge.comments().is_empty());
}
