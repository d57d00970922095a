//! Pull-request gated protocols: hotfix, release and feature branches.
//!
//! Policy violations are reported twice: as the returned error and as a
//! rejection posted to the pull request, so contributors see the remedy
//! without reading CI logs.

use tracing::{info, warn};

use super::{ActionRunner, RunContext};
use crate::error::{FlowError, Result};
use crate::forge::{feedback_mode, FeedbackMode, PullRequest, ReviewState};
use crate::image::{ImageBuilder, TagCheck};
use crate::mode::{Mode, HOTFIX_PREFIX, MERGEBACK_PREFIX, PRODUCTION_BRANCH, RELEASE_PREFIX};
use crate::version::read_version;

impl ActionRunner {
    /// `hotfix/*` and `release/*`: validate the pull request, publish the
    /// `-pre` image, run CI and approve.
    pub(super) async fn release_candidate(&self, ctx: &RunContext) -> Result<()> {
        let pr = self.single_pull_request(&ctx.branch).await?;
        let base = pr.base.ref_name.clone();
        let staging = self.config.staging_branch();

        let (prefix, base_allowed, guidance) = if ctx.mode == Mode::Hotfix {
            (
                HOTFIX_PREFIX,
                base == PRODUCTION_BRANCH || base == staging,
                format!("Hotfix branches must target {PRODUCTION_BRANCH} or {staging}."),
            )
        } else {
            (
                RELEASE_PREFIX,
                base == staging,
                format!("Release branches must target {staging}."),
            )
        };
        if !base_allowed {
            return Err(self
                .reject(
                    &pr,
                    format!("Pull request from {prefix} branch made against {base}"),
                    &guidance,
                )
                .await);
        }

        // Ancestry checks need the history of both sides.
        if self.git.is_shallow().await? {
            self.git.fetch_branch(&ctx.branch).await?;
        }
        let base_head = self.git.fetch_branch(&base).await?;

        if ctx.mode == Mode::Hotfix {
            let base_version =
                read_version(&self.git, self.config.repo_type, &self.git.tracking_ref(&base))
                    .await?;
            if base_version == ctx.version {
                return Err(self
                    .reject(
                        &pr,
                        format!(
                            "Version {} of {} is the same as on {base}",
                            ctx.version, ctx.branch
                        ),
                        "Bump the version so the hotfix gets its own release tag.",
                    )
                    .await);
            }
        }

        let tag = ctx.release_tag();
        if self.git.fetch_tag(&tag).await? {
            return Err(self
                .reject(
                    &pr,
                    format!("Tag {tag} already exists"),
                    "Bump the version to a release that has not been tagged yet.",
                )
                .await);
        }

        if !self
            .git
            .is_descendant(&base_head.sha, &ctx.head.sha)
            .await?
        {
            return Err(self
                .reject(
                    &pr,
                    format!("Branch {} is not a descendant of {base}", ctx.branch),
                    &format!("Merge or rebase {base} into {} and push again.", ctx.branch),
                )
                .await);
        }

        self.login().await?;
        let pre_tag = ctx.pre_release_tag();
        let postcondition = TagCheck::Absent { tag: tag.clone() };
        let published = ImageBuilder::new(self.docker.as_ref(), &self.git)
            .build_image(&pre_tag, &ctx.head, None, Some(&postcondition))
            .await;
        if let Err(err) = published {
            if matches!(err, FlowError::TagCreated { .. }) {
                self.send_feedback(
                    &pr,
                    ReviewState::RequestChanges,
                    &format!(
                        "{err}: tag {tag} was created while the image was building. \
                         Bump the version and push again."
                    ),
                )
                .await;
            }
            return Err(err);
        }

        self.run_ci().await?;

        let image = self.config.docker.image_reference(&pre_tag);
        self.send_feedback(
            &pr,
            ReviewState::Approve,
            &format!(
                "Checks passed. Image `{image}` has been pushed: deploy it and test it \
                 manually before merging."
            ),
        )
        .await;
        Ok(())
    }

    /// Any other branch: CI behind an open pull request that does not
    /// bypass the release paths.
    pub(super) async fn feature_branch(&self, ctx: &RunContext) -> Result<()> {
        let pr = self.single_pull_request(&ctx.branch).await?;
        let base = pr.base.ref_name.as_str();
        let staging = self.config.staging_branch();

        let into_staging = base == staging && !ctx.branch.starts_with(MERGEBACK_PREFIX);
        if into_staging || base == PRODUCTION_BRANCH {
            return Err(self
                .reject(
                    &pr,
                    format!("Pull request from {} made against {base}", ctx.branch),
                    &format!(
                        "Changes reach {base} only through {RELEASE_PREFIX}, {HOTFIX_PREFIX} \
                         or {MERGEBACK_PREFIX} branches."
                    ),
                )
                .await);
        }

        self.run_ci().await?;

        self.send_feedback(
            &pr,
            ReviewState::Approve,
            "All checks passed, the pull request is ready for manual review.",
        )
        .await;
        Ok(())
    }

    /// The one open pull request whose head is `branch`.
    async fn single_pull_request(&self, branch: &str) -> Result<PullRequest> {
        let mut prs = self.forge.get_open_pull_requests(branch).await?;
        match prs.len() {
            0 => Err(FlowError::NoPullRequest {
                branch: branch.to_string(),
            }),
            1 => {
                let pr = prs.remove(0);
                info!("Pull request #{} targets {}", pr.number, pr.base.ref_name);
                Ok(pr)
            }
            count => Err(FlowError::TooManyPullRequests {
                branch: branch.to_string(),
                count,
            }),
        }
    }

    /// Post a rejection and return the policy error to propagate.
    async fn reject(&self, pr: &PullRequest, message: String, guidance: &str) -> FlowError {
        let body = format!("{message}. {guidance}");
        self.send_feedback(pr, ReviewState::RequestChanges, &body)
            .await;
        FlowError::PolicyViolation(message)
    }

    /// Review, comment, or stay silent depending on the author.
    ///
    /// Failing to post is logged and does not mask the run's own result.
    async fn send_feedback(&self, pr: &PullRequest, verdict: ReviewState, body: &str) {
        let posted = match feedback_mode(&self.config.automation, &pr.user) {
            FeedbackMode::Review => {
                self.forge
                    .review_pull_request(pr.number, body, verdict)
                    .await
            }
            FeedbackMode::Comment => self.forge.comment_on_pull_request(pr.number, body).await,
            FeedbackMode::Skip => {
                info!("Not posting feedback on #{} by {}", pr.number, pr.user.login);
                Ok(())
            }
        };
        if let Err(err) = posted {
            warn!("Could not post feedback on #{}: {err}", pr.number);
        }
    }
}
