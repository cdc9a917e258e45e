use async_trait::async_trait;
use log::{debug, warn};

use crate::error::Result;
use crate::model::{GroupNode, Resource};

/// Read access to a group hierarchy.
#[async_trait]
pub trait GroupSource: Send + Sync {
    async fn subgroups(&self, group_id: u64) -> Result<Vec<GroupNode>>;

    /// Direct child projects of a group. `full_path` is filled in by the walker.
    async fn group_projects(&self, group_id: u64, include_archived: bool) -> Result<Vec<Resource>>;
}

/// A subgroup whose listing failed; its subtree was not visited.
#[derive(Debug)]
pub struct SkippedGroup {
    pub group_id: u64,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub resources: Vec<Resource>,
    pub skipped_groups: Vec<SkippedGroup>,
}

/// Flattens a group tree into a list of resources with ancestor-joined paths.
///
/// Uses an explicit stack, so depth is bounded only by memory. Projects of a
/// group come before those of its subgroups, and subgroups are visited in
/// listing order. Paths are relative to the root group.
pub struct TreeWalker<'a, S: GroupSource + ?Sized> {
    source: &'a S,
    include_archived: bool,
}

impl<'a, S: GroupSource + ?Sized> TreeWalker<'a, S> {
    pub fn new(source: &'a S, include_archived: bool) -> Self {
        Self {
            source,
            include_archived,
        }
    }

    /// Walk the tree below `root_group_id`.
    ///
    /// # Errors
    ///
    /// Fails only when the root group itself cannot be listed; failures below
    /// the root are recorded in `Discovery::skipped_groups`.
    pub async fn walk(&self, root_group_id: u64) -> Result<Discovery> {
        let mut discovery = Discovery::default();
        let mut stack = vec![(root_group_id, String::new())];

        while let Some((group_id, prefix)) = stack.pop() {
            let is_root = group_id == root_group_id && prefix.is_empty();

            let listed = self.list_group(group_id).await;
            let (projects, subgroups) = match listed {
                Ok(listing) => listing,
                Err(e) if is_root => return Err(e),
                Err(e) => {
                    warn!("Skipping group {prefix} ({group_id}): {e}");
                    discovery.skipped_groups.push(SkippedGroup {
                        group_id,
                        path: prefix,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            debug!(
                "Group {group_id} '{prefix}': {} projects, {} subgroups",
                projects.len(),
                subgroups.len()
            );

            for mut project in projects {
                project.full_path = join_path(&prefix, &project.path);
                discovery.resources.push(project);
            }

            // reversed so the first listed subgroup is popped first
            for group in subgroups.into_iter().rev() {
                stack.push((group.id, join_path(&prefix, &group.path)));
            }
        }

        Ok(discovery)
    }

    async fn list_group(&self, group_id: u64) -> Result<(Vec<Resource>, Vec<GroupNode>)> {
        let projects = self
            .source
            .group_projects(group_id, self.include_archived)
            .await?;
        let subgroups = self.source.subgroups(group_id).await?;
        Ok((projects, subgroups))
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeGroups {
        projects: HashMap<u64, Vec<Resource>>,
        children: HashMap<u64, Vec<GroupNode>>,
        broken: Vec<u64>,
    }

    impl FakeGroups {
        fn project(mut self, group: u64, id: u64, path: &str, archived: bool) -> Self {
            self.projects.entry(group).or_default().push(Resource {
                id,
                name: path.to_uppercase(),
                path: path.to_string(),
                full_path: String::new(),
                path_with_namespace: None,
                archived,
                clone_url: None,
            });
            self
        }

        fn subgroup(mut self, parent: u64, id: u64, path: &str) -> Self {
            self.children.entry(parent).or_default().push(GroupNode {
                id,
                path: path.to_string(),
            });
            self
        }
    }

    #[async_trait]
    impl GroupSource for FakeGroups {
        async fn subgroups(&self, group_id: u64) -> Result<Vec<GroupNode>> {
            if self.broken.contains(&group_id) {
                return Err(MigrateError::Upstream {
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            Ok(self.children.get(&group_id).cloned().unwrap_or_default())
        }

        async fn group_projects(
            &self,
            group_id: u64,
            include_archived: bool,
        ) -> Result<Vec<Resource>> {
            Ok(self
                .projects
                .get(&group_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|p| include_archived || !p.archived)
                .collect())
        }
    }

    fn paths(discovery: &Discovery) -> Vec<&str> {
        discovery
            .resources
            .iter()
            .map(|r| r.full_path.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_project_and_subgroup_project() {
        let source = FakeGroups::default()
            .project(1, 10, "p", false)
            .subgroup(1, 2, "s")
            .project(2, 20, "q", false);

        let discovery = TreeWalker::new(&source, false).walk(1).await.unwrap();

        assert_eq!(paths(&discovery), vec!["p", "s/q"]);
        assert_eq!(discovery.resources[1].id, 20);
        assert!(discovery.skipped_groups.is_empty());
    }

    #[tokio::test]
    async fn test_order_is_depth_first_in_listing_order() {
        let source = FakeGroups::default()
            .project(1, 10, "root-a", false)
            .project(1, 11, "root-b", false)
            .subgroup(1, 2, "alpha")
            .subgroup(1, 3, "beta")
            .subgroup(2, 4, "deep")
            .project(2, 20, "a1", false)
            .project(4, 40, "d1", false)
            .project(3, 30, "b1", false);

        let discovery = TreeWalker::new(&source, false).walk(1).await.unwrap();

        assert_eq!(
            paths(&discovery),
            vec!["root-a", "root-b", "alpha/a1", "alpha/deep/d1", "beta/b1"]
        );
    }

    #[tokio::test]
    async fn test_deep_hierarchy_does_not_overflow() {
        let mut source = FakeGroups::default();
        for level in 1..5_000u64 {
            source = source.subgroup(level, level + 1, "n");
        }
        source = source.project(5_000, 1, "leaf", false);

        let discovery = TreeWalker::new(&source, false).walk(1).await.unwrap();

        assert_eq!(discovery.resources.len(), 1);
        let leaf = &discovery.resources[0].full_path;
        assert_eq!(leaf.matches('/').count(), 4_999);
        assert!(leaf.ends_with("n/leaf"));
    }

    #[tokio::test]
    async fn test_archived_projects_follow_flag() {
        let source = FakeGroups::default()
            .project(1, 10, "live", false)
            .project(1, 11, "old", true);

        let without = TreeWalker::new(&source, false).walk(1).await.unwrap();
        let with = TreeWalker::new(&source, true).walk(1).await.unwrap();

        assert_eq!(paths(&without), vec!["live"]);
        assert_eq!(paths(&with), vec!["live", "old"]);
    }

    #[tokio::test]
    async fn test_broken_subgroup_is_skipped() {
        let mut source = FakeGroups::default()
            .subgroup(1, 2, "secret")
            .subgroup(1, 3, "open")
            .project(2, 20, "hidden", false)
            .project(3, 30, "visible", false);
        source.broken.push(2);

        let discovery = TreeWalker::new(&source, false).walk(1).await.unwrap();

        assert_eq!(paths(&discovery), vec!["open/visible"]);
        assert_eq!(discovery.skipped_groups.len(), 1);
        assert_eq!(discovery.skipped_groups[0].path, "secret");
    }

    #[tokio::test]
    async fn test_broken_root_is_an_error() {
        let mut source = FakeGroups::default().project(1, 10, "p", false);
        source.broken.push(1);

        let result = TreeWalker::new(&source, false).walk(1).await;
        assert!(result.is_err());
    }
}
