//! Code host integration.
//!
//! The engine opens the release merge request once the release branch has
//! been pushed. When the host reports that one already exists (a previous
//! attempt succeeded but its response was lost), the open one is looked up
//! instead.

mod gitlab;

pub use gitlab::{GitLabClient, GitLabConfig};

use crate::error::CodeHostError;
use std::future::Future;
use std::sync::Arc;

/// Merge request to open on the code host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestDraft {
    /// Project id (numeric id or path)
    pub project_id: String,
    /// Branch to merge
    pub source_branch: String,
    /// Branch to merge into
    pub target_branch: String,
    /// Title
    pub title: String,
    /// Description (markdown)
    pub description: String,
}

/// Remote capability used by the `CreateRemoteMr` step
pub trait CodeHost {
    /// Create a merge request and return its web URL
    fn create_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> impl Future<Output = Result<String, CodeHostError>>;

    /// Web URL of the open merge request from `draft.source_branch` into
    /// `draft.target_branch`, if there is one
    fn find_open_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> impl Future<Output = Result<Option<String>, CodeHostError>>;
}

impl<H: CodeHost> CodeHost for Arc<H> {
    fn create_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> impl Future<Output = Result<String, CodeHostError>> {
        (**self).create_merge_request(draft)
    }

    fn find_open_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> impl Future<Output = Result<Option<String>, CodeHostError>> {
        (**self).find_open_merge_request(draft)
    }
}
