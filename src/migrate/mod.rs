//! Batch commands. Each walks the source group tree, then processes every
//! discovered project sequentially, recording per-item outcomes in a
//! [`RunReport`] instead of aborting the batch.

pub mod export;
#[cfg(test)]
pub(crate) mod fake;
pub mod issues;
pub mod lfs;
pub mod merge_requests;
pub mod mirror;
pub mod report;
pub mod users;

use log::debug;
use regex::Regex;

use crate::error::Result;
use crate::model::Resource;
use crate::output::Spinner;
use crate::tree::{GroupSource, TreeWalker};
use report::RunReport;

/// Which discovered projects a command processes.
#[derive(Debug, Clone, Default)]
pub struct ProjectScope {
    pub include_archived: bool,
    /// Matched against the namespaced project path
    pub filter: Option<Regex>,
    /// Cap on discovered projects, applied before the filter; 0 = all
    pub max_projects: usize,
}

impl ProjectScope {
    pub fn new(include_archived: bool, filter: Option<&str>, max_projects: usize) -> Result<Self> {
        Ok(Self {
            include_archived,
            filter: filter.map(Regex::new).transpose()?,
            max_projects,
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |re| re.is_match(resource.display_path()))
    }
}

/// Walk the tree below `root_group_id` and return the projects in scope.
///
/// Subgroups that could not be listed are reported as failures; only a
/// failure to list the root group is an error.
pub async fn discover<S: GroupSource + ?Sized>(
    source: &S,
    root_group_id: u64,
    scope: &ProjectScope,
    report: &mut RunReport,
) -> Result<Vec<Resource>> {
    let spinner = Spinner::start(format!("Discovering projects under group {root_group_id}"));
    let discovery = match TreeWalker::new(source, scope.include_archived)
        .walk(root_group_id)
        .await
    {
        Ok(discovery) => discovery,
        Err(e) => {
            spinner.fail(format!("Could not list group {root_group_id}"));
            return Err(e);
        }
    };

    spinner.update(format!(
        "Found {} projects, applying scope",
        discovery.resources.len()
    ));
    for skipped in &discovery.skipped_groups {
        report.failed(
            &skipped.path,
            None,
            format!("group {} listing failed: {}", skipped.group_id, skipped.reason),
        );
    }

    let mut resources = discovery.resources;
    if scope.max_projects > 0 {
        resources.truncate(scope.max_projects);
    }
    resources.retain(|r| {
        let keep = scope.matches(r);
        if !keep {
            debug!("Filtered out {}", r.display_path());
        }
        keep
    });

    spinner.finish(format!("Discovered {} projects", resources.len()));
    Ok(resources)
}

/// Destination repository for a source project.
pub fn destination_repo(org: &str, resource: &Resource) -> String {
    format!("{org}/{}", resource.flattened_name())
}
