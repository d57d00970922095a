//! Image build orchestration: reuse, retag or build, then verify the git tag
//! did not move underneath the build before anything is pushed.
//!
//! The ordering is build (or retag) first, tag postcondition second, push
//! last. An image is never published for a tag whose meaning changed while
//! the build was running.

use tracing::{info, warn};

use crate::docker::{BuildRequest, DockerController, ImageMetadata};
use crate::error::{FlowError, Result};
use crate::git::{CommitRef, GitRepo};

/// How to treat images that already exist in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingImageCheck {
    /// Fail when the target tag exists with a different tree.
    pub strict: bool,
    /// Alternate tags whose image may be retagged instead of rebuilt.
    pub also_check: Vec<String>,
}

/// What must hold for a git tag after the build and before the push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCheck {
    /// The remote tag still points at `sha`.
    Matches { tag: String, sha: String },
    /// The remote tag still does not exist.
    Absent { tag: String },
}

/// Where the image for a target tag comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// The target tag already holds an image of the current tree.
    UpToDate,
    /// Copy an existing image of the current tree.
    Retag { from: String },
    /// Build from the checkout.
    Build,
}

/// Coordinates the docker capability with git tag verification.
pub struct ImageBuilder<'a> {
    docker: &'a dyn DockerController,
    git: &'a GitRepo,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(docker: &'a dyn DockerController, git: &'a GitRepo) -> Self {
        Self { docker, git }
    }

    /// Decide whether `tag` needs a build, a retag, or nothing.
    pub async fn resolve_source(
        &self,
        tag: &str,
        head: &CommitRef,
        check: Option<&ExistingImageCheck>,
    ) -> Result<ImageSource> {
        let Some(check) = check else {
            return Ok(ImageSource::Build);
        };

        if let Some(meta) = self.inspect(tag).await? {
            if meta.matches_tree(&head.tree) {
                info!("Image {tag} already built from tree {}", head.tree);
                return Ok(ImageSource::UpToDate);
            }
            if check.strict {
                return Err(FlowError::ContentMismatch(format!(
                    "Image {tag} built with different tree: expected {}, found {}",
                    head.tree,
                    meta.tree_sha.as_deref().unwrap_or("none")
                )));
            }
            warn!("Image {tag} was built from another tree, it will be replaced");
        }

        for candidate in &check.also_check {
            if let Some(meta) = self.inspect(candidate).await? {
                if meta.matches_tree(&head.tree) {
                    info!("Image {candidate} matches tree {}, reusing it", head.tree);
                    return Ok(ImageSource::Retag {
                        from: candidate.clone(),
                    });
                }
            }
        }

        Ok(ImageSource::Build)
    }

    /// Materialise `tag` from `source`, verify `postcondition`, then push.
    pub async fn publish(
        &self,
        tag: &str,
        head: &CommitRef,
        source: &ImageSource,
        postcondition: Option<&TagCheck>,
    ) -> Result<()> {
        match source {
            ImageSource::UpToDate => return Ok(()),
            ImageSource::Retag { from } => {
                info!("Retagging image {from} as {tag}");
                self.docker.retag_image(from, tag).await?;
            }
            ImageSource::Build => {
                info!("Building image {tag} from commit {}", head.sha);
                self.docker
                    .run_build(&BuildRequest {
                        cwd: self.git.dir().to_path_buf(),
                        tag: tag.to_string(),
                        commit_sha: head.sha.clone(),
                        tree_sha: head.tree.clone(),
                    })
                    .await?;
            }
        }

        if let Some(check) = postcondition {
            self.verify_tag(check).await?;
        }

        info!("Pushing image {tag}");
        self.docker.push_image(tag).await
    }

    /// Resolve the source for `tag` and publish it in one go.
    pub async fn build_image(
        &self,
        tag: &str,
        head: &CommitRef,
        check: Option<&ExistingImageCheck>,
        postcondition: Option<&TagCheck>,
    ) -> Result<ImageSource> {
        let source = self.resolve_source(tag, head, check).await?;
        self.publish(tag, head, &source, postcondition).await?;
        Ok(source)
    }

    /// Re-read the remote tag and compare it with what the caller saw
    /// before the build.
    pub async fn verify_tag(&self, check: &TagCheck) -> Result<()> {
        match check {
            TagCheck::Matches { tag, sha } => {
                self.git.delete_local_tag(tag).await?;
                if !self.git.fetch_tag(tag).await? {
                    return Err(FlowError::TagChanged { tag: tag.clone() });
                }
                let current = self.git.resolve_commit(tag).await?;
                if current.sha != *sha {
                    return Err(FlowError::TagChanged { tag: tag.clone() });
                }
                Ok(())
            }
            TagCheck::Absent { tag } => {
                if self.git.fetch_tag(tag).await? {
                    return Err(FlowError::TagCreated { tag: tag.clone() });
                }
                Ok(())
            }
        }
    }

    async fn inspect(&self, tag: &str) -> Result<Option<ImageMetadata>> {
        if !self.docker.pull_image(tag).await? {
            warn!("Image {tag} does not exist yet");
            return Ok(None);
        }
        self.docker.get_metadata(tag).await.map(Some)
    }
}
