use futures::TryStreamExt;
use streamdef_types::{Branch, ObjectKey, ProjectId};

use crate::entity::EntityRepository;
use crate::error::{RepositoryError, RepositoryResult};

/// Branches of projects. Projects themselves live outside this repository.
pub type BranchRepository = EntityRepository<Branch>;

impl EntityRepository<Branch> {
    /// The active branch of a project flagged as default.
    pub async fn get_default(&self, project_id: ProjectId) -> RepositoryResult<Branch> {
        let mut branches = self.list(&ObjectKey::Project(project_id));
        while let Some(branch) = branches.try_next().await? {
            if branch.is_default {
                return Ok(branch);
            }
        }
        Err(RepositoryError::NotFound {
            entity: "branch".to_string(),
            id: "default".to_string(),
            parent: "project",
        })
    }
}
