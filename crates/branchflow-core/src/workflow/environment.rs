//! Environment branch protocols: production, staging and development.

use serde_json::json;
use tracing::info;

use super::{ActionRunner, RunContext};
use crate::error::{FlowError, Result};
use crate::forge::{DeploymentRequest, NewPullRequest};
use crate::image::{ExistingImageCheck, ImageBuilder, ImageSource, TagCheck};
use crate::mode::{Mode, DEVELOP_BRANCH, ENV_PREFIX, MERGEBACK_PREFIX};

impl ActionRunner {
    /// `env/prod` and the staging branch.
    ///
    /// The release tag is bound to exactly one tree. Production mints it on
    /// first push; staging only ever publishes the `-pre` image and leaves
    /// the bare tag to the production promotion.
    pub(super) async fn release_environment(&self, ctx: &RunContext) -> Result<()> {
        let tag = ctx.release_tag();

        let tag_sha = if self.git.fetch_tag(&tag).await? {
            let tagged = self.git.resolve_commit(&tag).await?;
            if !tagged.same_tree(&ctx.head) {
                return Err(FlowError::ContentMismatch(format!(
                    "New push to {} without bumping version",
                    ctx.branch
                )));
            }
            info!("Tag {tag} already points at tree {}", tagged.tree);
            Some(tagged.sha)
        } else if ctx.mode == Mode::EnvProduction {
            info!("Creating tag {tag} at {}", ctx.head.sha);
            self.git.create_tag(&tag, &ctx.head.sha).await?;
            self.git.push_tag(&tag).await?;
            Some(ctx.head.sha.clone())
        } else {
            None
        };

        self.login().await?;
        let builder = ImageBuilder::new(self.docker.as_ref(), &self.git);

        let image_tag = if ctx.mode == Mode::EnvProduction {
            // Production is the trust anchor: its tag may only ever hold an
            // image of this tree.
            let check = ExistingImageCheck {
                strict: true,
                also_check: vec![ctx.pre_release_tag()],
            };
            let postcondition = tag_sha.map(|sha| TagCheck::Matches {
                tag: tag.clone(),
                sha,
            });
            builder
                .build_image(&tag, &ctx.head, Some(&check), postcondition.as_ref())
                .await?;
            tag.clone()
        } else {
            let pre_tag = ctx.pre_release_tag();
            let check = ExistingImageCheck {
                strict: false,
                also_check: vec![tag.clone()],
            };
            let source = builder
                .resolve_source(&pre_tag, &ctx.head, Some(&check))
                .await?;
            let postcondition = staging_postcondition(&tag, tag_sha, &source);
            builder
                .publish(&pre_tag, &ctx.head, &source, postcondition.as_ref())
                .await?;
            pre_tag
        };

        self.request_deployment(ctx, &image_tag).await?;
        self.open_mergeback(ctx).await
    }

    /// Development environment branches: always rebuild, never tag.
    pub(super) async fn development_environment(&self, ctx: &RunContext) -> Result<()> {
        let tag = ctx.branch.replace('/', "-");
        self.login().await?;
        ImageBuilder::new(self.docker.as_ref(), &self.git)
            .build_image(&tag, &ctx.head, None, None)
            .await?;
        self.request_deployment(ctx, &tag).await
    }

    async fn request_deployment(&self, ctx: &RunContext, image_tag: &str) -> Result<()> {
        let Some(binding) = self.config.deployment_for(&ctx.branch) else {
            return Ok(());
        };
        info!(
            "Requesting deployment of {image_tag} to {}",
            binding.environment
        );
        self.forge
            .create_deployment(&DeploymentRequest {
                git_ref: ctx.head.sha.clone(),
                task: "deploy".to_string(),
                auto_merge: false,
                required_contexts: vec![],
                payload: json!({
                    "tag": image_tag,
                    "image": self.config.docker.image_reference(image_tag),
                }),
                environment: binding.environment.clone(),
                transient_environment: ctx.mode == Mode::EnvDevelopment,
                production_environment: ctx.mode == Mode::EnvProduction,
            })
            .await
    }

    /// Push `mergeback/<env>/<version>` and open its pull request once.
    async fn open_mergeback(&self, ctx: &RunContext) -> Result<()> {
        let env = ctx
            .branch
            .strip_prefix(ENV_PREFIX)
            .unwrap_or(ctx.branch.as_str());
        let mergeback = format!("{MERGEBACK_PREFIX}{env}/{}", ctx.version);

        info!("Pushing {mergeback} at {}", ctx.head.sha);
        self.git.create_branch(&mergeback, &ctx.head.sha).await?;
        self.git.push_branch(&mergeback).await?;

        let base = if ctx.mode == Mode::EnvProduction {
            self.config.staging_branch()
        } else {
            DEVELOP_BRANCH
        };

        if !self
            .forge
            .get_open_pull_requests(&mergeback)
            .await?
            .is_empty()
        {
            info!("Pull request for {mergeback} is already open");
            return Ok(());
        }

        let pr = self
            .forge
            .open_pull_request(&NewPullRequest {
                base: base.to_string(),
                head: mergeback.clone(),
                title: format!("Merge {} v{} back into {base}", ctx.branch, ctx.version),
                labels: self.config.mergeback_labels.clone(),
            })
            .await?;
        info!("Opened pull request #{} from {mergeback} into {base}", pr.number);
        Ok(())
    }
}

/// What must hold for the release tag once the staging image is ready.
///
/// A known release tag must not have moved. An unknown one must still be
/// absent after a fresh build; a retag of the production image carries no
/// extra condition.
fn staging_postcondition(
    tag: &str,
    tag_sha: Option<String>,
    source: &ImageSource,
) -> Option<TagCheck> {
    match (tag_sha, source) {
        (Some(sha), _) => Some(TagCheck::Matches {
            tag: tag.to_string(),
            sha,
        }),
        (None, ImageSource::Retag { .. }) => None,
        (None, _) => Some(TagCheck::Absent {
            tag: tag.to_string(),
        }),
    }
}
