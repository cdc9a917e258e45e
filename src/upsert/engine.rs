use log::{debug, info, warn};
use std::collections::HashMap;

use super::destination::{
    Destination, ExistingObject, IssueDraft, ObjectKind, PullRequestDraft, Upsert,
};
use super::marker::Marker;
use crate::error::Result;
use crate::identity::IdentityMap;
use crate::model::{format_time, BranchRef, ChangeRecord, LabelSpec, NoteRecord, RecordState};
use crate::pacing::Pacer;

/// Label attached to issues created in place of unimportable merge requests.
pub const HISTORICAL_MR_LABEL: &str = "historical-mr";

const IMPORT_BRANCH_PREFIX: &str = "import/";
const LAST_RESORT_BASE: &str = "main";

/// What to do when the destination rejects a pull request for having no
/// diff or an invalid head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Create an issue carrying the same marker, tagged with `label`
    IssueSubstitute { label: String },
    /// Record a warning and create nothing
    Skip,
}

impl FallbackPolicy {
    pub fn from_switch(issue_when_nodiff: bool) -> Self {
        if issue_when_nodiff {
            Self::IssueSubstitute {
                label: HISTORICAL_MR_LABEL.to_string(),
            }
        } else {
            Self::Skip
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub include_system_notes: bool,
    pub fallback: FallbackPolicy,
    /// Delay between replayed comments
    pub comment_pacing: Pacer,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            include_system_notes: false,
            fallback: FallbackPolicy::Skip,
            comment_pacing: Pacer::default(),
        }
    }
}

/// Head-branch lifecycle while satisfying a pull-request precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Missing,
    CreatedFromSha,
    Exists,
    /// Head replaced by the base branch; the pull request will have no diff
    FallbackToBase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPair {
    pub head: String,
    pub base: String,
    pub state: BranchState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Created { kind: ObjectKind, number: u64 },
    AlreadyImported { kind: ObjectKind, number: u64 },
    /// An issue was created because the pull request could not be
    Substituted { number: u64 },
    Skipped { reason: String },
}

impl ImportOutcome {
    pub fn describe(&self) -> String {
        match self {
            Self::Created { kind, number } => format!("created {} #{number}", kind.as_str()),
            Self::AlreadyImported { kind, number } => {
                format!("already imported as {} #{number}", kind.as_str())
            }
            Self::Substituted { number } => format!("created substitute issue #{number}"),
            Self::Skipped { reason } => format!("skipped: {reason}"),
        }
    }
}

/// One source record and the context needed to recreate it.
#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'r> {
    /// Destination repository (`owner/name`)
    pub repo: &'r str,
    pub project_id: u64,
    pub record: &'r ChangeRecord,
    pub notes: &'r [NoteRecord],
}

type MarkerIndex = HashMap<Marker, ExistingObject>;

/// Find-or-create engine guaranteeing at most one destination object per
/// source record.
///
/// Existing objects are indexed by marker once per repository and kind, then
/// kept current as this engine creates or transitions objects.
pub struct UpsertEngine<'a, D: Destination + ?Sized> {
    destination: &'a D,
    identities: &'a IdentityMap,
    options: EngineOptions,
    index: HashMap<(String, ObjectKind), MarkerIndex>,
}

impl<'a, D: Destination + ?Sized> UpsertEngine<'a, D> {
    pub fn new(destination: &'a D, identities: &'a IdentityMap, options: EngineOptions) -> Self {
        Self {
            destination,
            identities,
            options,
            index: HashMap::new(),
        }
    }

    /// Recreate a merge request as a pull request.
    ///
    /// Order: marker lookup, preconditions (labels, milestone, refs),
    /// creation, labels/milestone, comments, and the state transition last so
    /// that a partially populated pull request is never closed or merged.
    pub async fn import_merge_request(&mut self, request: ImportRequest<'_>) -> Result<ImportOutcome> {
        let ImportRequest {
            repo,
            project_id,
            record,
            notes,
        } = request;
        let marker = Marker::MergeRequest {
            project_id,
            iid: record.iid,
        };

        for kind in [ObjectKind::PullRequest, ObjectKind::Issue] {
            if let Some(existing) = self.find_existing(repo, kind, &marker).await? {
                info!("MR !{} already imported as {} #{}", record.iid, kind.as_str(), existing.number);
                if kind == ObjectKind::PullRequest {
                    self.reconcile(repo, &marker, &existing, record, notes).await?;
                }
                return Ok(ImportOutcome::AlreadyImported {
                    kind,
                    number: existing.number,
                });
            }
        }

        self.ensure_labels(repo, record.labels.iter().map(LabelSpec::named))
            .await;
        let milestone = self.ensure_milestone(repo, record.milestone.as_deref()).await;
        let refs = self.resolve_refs(repo, record).await?;
        debug!("MR !{} refs: {:?}", record.iid, refs);

        let draft = PullRequestDraft {
            title: record.title.clone(),
            body: self.merge_request_body(&marker, record),
            head: refs.head,
            base: refs.base,
        };

        let number = match self.destination.create_pull_request(repo, &draft).await {
            Ok(number) => number,
            Err(e) if e.is_precondition_failure() => {
                return self.apply_fallback(repo, &marker, record, &draft.body, &e.to_string()).await;
            }
            Err(e) => return Err(e),
        };
        info!("Created PR #{number} for MR !{} in {repo}", record.iid);

        let created = ExistingObject {
            number,
            kind: ObjectKind::PullRequest,
            body: draft.body,
            open: true,
            merged: false,
        };
        self.remember(repo, marker, created.clone());

        self.apply_labels_and_milestone(repo, number, record, milestone)
            .await;
        self.replay_notes(repo, number, notes, true).await?;
        self.apply_state(repo, &marker, &created, record).await?;

        Ok(ImportOutcome::Created {
            kind: ObjectKind::PullRequest,
            number,
        })
    }

    /// Recreate a source issue as a destination issue.
    pub async fn import_issue(&mut self, request: ImportRequest<'_>) -> Result<ImportOutcome> {
        let ImportRequest {
            repo,
            project_id,
            record,
            notes,
        } = request;
        let marker = Marker::Issue {
            project_id,
            iid: record.iid,
        };

        if let Some(existing) = self.find_existing(repo, ObjectKind::Issue, &marker).await? {
            info!("Issue #{} already imported as #{}", record.iid, existing.number);
            self.reconcile(repo, &marker, &existing, record, notes).await?;
            return Ok(ImportOutcome::AlreadyImported {
                kind: ObjectKind::Issue,
                number: existing.number,
            });
        }

        self.ensure_labels(repo, record.labels.iter().map(LabelSpec::named))
            .await;
        let milestone = self.ensure_milestone(repo, record.milestone.as_deref()).await;

        let assignees = record
            .assignee
            .as_deref()
            .and_then(|a| self.identities.lookup(a))
            .map(|a| vec![a.to_string()])
            .unwrap_or_default();

        let draft = IssueDraft {
            title: record.title.clone(),
            body: self.issue_body(&marker, record),
            labels: record.labels.iter().cloned().collect(),
            assignees,
        };
        let number = self.destination.create_issue(repo, &draft).await?;
        info!("Created issue #{number} for issue #{} in {repo}", record.iid);

        let created = ExistingObject {
            number,
            kind: ObjectKind::Issue,
            body: draft.body,
            open: true,
            merged: false,
        };
        self.remember(repo, marker, created.clone());

        if let Some(milestone) = milestone {
            if let Err(e) = self.destination.set_milestone(repo, number, milestone).await {
                warn!("Failed to set milestone on {repo}#{number}: {e}");
            }
        }
        self.replay_notes(repo, number, notes, true).await?;
        self.apply_state(repo, &marker, &created, record).await?;

        Ok(ImportOutcome::Created {
            kind: ObjectKind::Issue,
            number,
        })
    }

    /// Make sure head and base refs exist for a pull request.
    ///
    /// A missing head is recreated as `import/<branch>` from the recorded SHA
    /// when the destination has that commit; otherwise the base stands in.
    pub async fn resolve_refs(&self, repo: &str, record: &ChangeRecord) -> Result<RefPair> {
        let base = self
            .resolve_base(repo, record.target_branch.as_deref())
            .await?;
        let head = record
            .source_branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(&base)
            .to_string();

        if self.destination.branch_exists(repo, &head).await? {
            return Ok(RefPair {
                head,
                base,
                state: BranchState::Exists,
            });
        }

        let mut state = BranchState::Missing;
        debug!("Head branch {head} missing in {repo} ({state:?})");

        if let Some(sha) = record.head_sha.as_deref().filter(|s| is_plausible_sha(s)) {
            if self.destination.commit_exists(repo, sha).await? {
                let branch = BranchRef {
                    name: format!("{IMPORT_BRANCH_PREFIX}{head}"),
                    target_sha: sha.to_string(),
                };
                state = match self.destination.create_branch(repo, &branch).await? {
                    Upsert::Created(()) => {
                        info!("Created branch {} at {} in {repo}", branch.name, short_sha(sha));
                        BranchState::CreatedFromSha
                    }
                    Upsert::AlreadyExists(()) => BranchState::Exists,
                    Upsert::Failed(reason) => {
                        warn!("Failed to create branch {} from {}: {reason}", branch.name, short_sha(sha));
                        BranchState::Missing
                    }
                };
                if state != BranchState::Missing {
                    return Ok(RefPair {
                        head: branch.name,
                        base,
                        state,
                    });
                }
            }
        }

        debug!("Falling back to base {base} as head in {repo} ({state:?})");
        Ok(RefPair {
            head: base.clone(),
            base,
            state: BranchState::FallbackToBase,
        })
    }

    async fn resolve_base(&self, repo: &str, target: Option<&str>) -> Result<String> {
        let target = target.filter(|t| !t.is_empty());
        let mut default_branch = None;

        let candidate = match target {
            Some(t) => t.to_string(),
            None => {
                let branch = self.destination.default_branch(repo).await?;
                default_branch = Some(branch.clone());
                branch
            }
        };
        if self.destination.branch_exists(repo, &candidate).await? {
            return Ok(candidate);
        }

        let default_branch = match default_branch {
            Some(branch) => branch,
            None => self.destination.default_branch(repo).await?,
        };
        if default_branch != candidate && self.destination.branch_exists(repo, &default_branch).await? {
            return Ok(default_branch);
        }

        Ok(LAST_RESORT_BASE.to_string())
    }

    async fn apply_fallback(
        &mut self,
        repo: &str,
        marker: &Marker,
        record: &ChangeRecord,
        body: &str,
        reason: &str,
    ) -> Result<ImportOutcome> {
        match self.options.fallback.clone() {
            FallbackPolicy::Skip => {
                warn!("Skipping MR !{} (no diff / invalid head): {reason}", record.iid);
                Ok(ImportOutcome::Skipped {
                    reason: format!("no diff / invalid head: {reason}"),
                })
            }
            FallbackPolicy::IssueSubstitute { label } => {
                self.ensure_labels(repo, std::iter::once(LabelSpec::named(label.clone())))
                    .await;
                let draft = IssueDraft {
                    title: format!("[Historical MR] {}", record.title),
                    body: body.to_string(),
                    labels: vec![label],
                    assignees: Vec::new(),
                };
                let number = self.destination.create_issue(repo, &draft).await?;
                warn!(
                    "Created issue #{number} instead of PR for MR !{} (no diff / invalid head)",
                    record.iid
                );
                self.remember(
                    repo,
                    *marker,
                    ExistingObject {
                        number,
                        kind: ObjectKind::Issue,
                        body: draft.body,
                        open: true,
                        merged: false,
                    },
                );
                Ok(ImportOutcome::Substituted { number })
            }
        }
    }

    /// Bring a previously imported object up to date without recreating it.
    async fn reconcile(
        &mut self,
        repo: &str,
        marker: &Marker,
        existing: &ExistingObject,
        record: &ChangeRecord,
        notes: &[NoteRecord],
    ) -> Result<()> {
        if !record.labels.is_empty() {
            self.ensure_labels(repo, record.labels.iter().map(LabelSpec::named))
                .await;
            self.apply_labels_and_milestone(repo, existing.number, record, None)
                .await;
        }
        self.replay_notes(repo, existing.number, notes, false).await?;
        self.apply_state(repo, marker, existing, record).await
    }

    /// Create labels that do not exist yet; failures are logged only.
    async fn ensure_labels(&self, repo: &str, labels: impl Iterator<Item = LabelSpec>) {
        for label in labels {
            match self.destination.ensure_label(repo, &label).await {
                Ok(Upsert::Created(())) => debug!("Created label '{}' in {repo}", label.name),
                Ok(Upsert::AlreadyExists(())) => {}
                Ok(Upsert::Failed(reason)) => {
                    warn!("Failed to ensure label '{}' on {repo}: {reason}", label.name);
                }
                Err(e) => warn!("Failed to ensure label '{}' on {repo}: {e}", label.name),
            }
        }
    }

    /// Find a milestone by title or create it. `None` when unavailable.
    async fn ensure_milestone(&self, repo: &str, title: Option<&str>) -> Option<u64> {
        let title = title.filter(|t| !t.is_empty())?;
        let result = match self.destination.find_milestone(repo, title).await {
            Ok(Some(number)) => Ok(number),
            Ok(None) => self.destination.create_milestone(repo, title).await,
            Err(e) => Err(e),
        };
        result
            .inspect_err(|e| warn!("Failed to ensure milestone '{title}' on {repo}: {e}"))
            .ok()
    }

    async fn apply_labels_and_milestone(
        &self,
        repo: &str,
        number: u64,
        record: &ChangeRecord,
        milestone: Option<u64>,
    ) {
        if !record.labels.is_empty() {
            let labels: Vec<String> = record.labels.iter().cloned().collect();
            if let Err(e) = self.destination.set_labels(repo, number, &labels).await {
                warn!("Failed to set labels on {repo}#{number}: {e}");
            }
        }
        if let Some(milestone) = milestone {
            if let Err(e) = self.destination.set_milestone(repo, number, milestone).await {
                warn!("Failed to set milestone on {repo}#{number}: {e}");
            }
        }
    }

    /// Post source notes as comments in chronological order, skipping notes
    /// whose marker is already present on the destination.
    async fn replay_notes(
        &self,
        repo: &str,
        number: u64,
        notes: &[NoteRecord],
        fresh: bool,
    ) -> Result<usize> {
        let mut pending: Vec<&NoteRecord> = notes
            .iter()
            .filter(|n| self.options.include_system_notes || !n.system)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        pending.sort_by_key(|n| (n.created_at, n.id));

        let existing = if fresh {
            Vec::new()
        } else {
            self.destination.comment_bodies(repo, number).await?
        };

        let mut posted = 0;
        for note in pending {
            let marker = Marker::Note { note_id: note.id };
            if existing.iter().any(|body| marker.is_in(body)) {
                continue;
            }
            self.destination
                .add_comment(repo, number, &self.note_body(&marker, note))
                .await?;
            posted += 1;
            self.options.comment_pacing.pause().await;
        }

        if posted > 0 {
            debug!("Posted {posted} comments on {repo}#{number}");
        }
        Ok(posted)
    }

    /// Move the object to the record's final state if it is not there yet.
    async fn apply_state(
        &mut self,
        repo: &str,
        marker: &Marker,
        current: &ExistingObject,
        record: &ChangeRecord,
    ) -> Result<()> {
        let mut updated = current.clone();

        match record.state {
            RecordState::Open => return Ok(()),
            RecordState::Merged if current.kind == ObjectKind::PullRequest && !current.merged => {
                let message = format!("Merged in GitLab (MR !{})", record.iid);
                if current.open
                    && self
                        .destination
                        .merge_pull_request(repo, current.number, &message)
                        .await?
                {
                    info!("Merged PR #{} in {repo}", current.number);
                    updated.open = false;
                    updated.merged = true;
                } else if current.open {
                    info!("Could not merge PR #{}; closing instead", current.number);
                    self.destination.close(repo, current.number).await?;
                    updated.open = false;
                }
            }
            RecordState::Merged | RecordState::Closed => {
                if current.open {
                    self.destination.close(repo, current.number).await?;
                    updated.open = false;
                }
            }
        }

        if updated != *current {
            self.remember(repo, *marker, updated);
        }
        Ok(())
    }

    async fn find_existing(
        &mut self,
        repo: &str,
        kind: ObjectKind,
        marker: &Marker,
    ) -> Result<Option<ExistingObject>> {
        let key = (repo.to_string(), kind);
        if !self.index.contains_key(&key) {
            let objects = self.destination.list_objects(repo, kind).await?;
            debug!("Indexing {} existing {} objects in {repo}", objects.len(), kind.as_str());
            let mut index = MarkerIndex::new();
            for object in objects {
                for found in Marker::find_all(&object.body) {
                    index.entry(found).or_insert_with(|| object.clone());
                }
            }
            self.index.insert(key.clone(), index);
        }
        Ok(self.index.get(&key).and_then(|index| index.get(marker)).cloned())
    }

    fn remember(&mut self, repo: &str, marker: Marker, object: ExistingObject) {
        self.index
            .entry((repo.to_string(), object.kind))
            .or_default()
            .insert(marker, object);
    }

    fn merge_request_body(&self, marker: &Marker, record: &ChangeRecord) -> String {
        let author = record.author.as_deref().unwrap_or(crate::identity::UNKNOWN_IDENTITY);
        let head_sha = record.head_sha.as_deref().map(short_sha).unwrap_or_default();
        [
            marker.to_string(),
            String::new(),
            format!("**Imported from GitLab MR !{}**", record.iid),
            format!(
                "- Original author: `{author}` (mapped to `{}`)",
                self.identities.map(record.author.as_deref())
            ),
            format!("- Created at: `{}`", format_time(record.created_at.as_ref())),
            format!(
                "- State on GitLab: `{}` (merged_at={})",
                record.source_state,
                format_time(record.merged_at.as_ref())
            ),
            format!(
                "- Source → Target: `{}` → `{}`",
                record.source_branch.as_deref().unwrap_or("unknown"),
                record.target_branch.as_deref().unwrap_or("unknown")
            ),
            format!("- Head SHA: `{head_sha}`"),
            format!(
                "- Original URL: {}",
                record.web_url.as_deref().unwrap_or_default()
            ),
            String::new(),
            "---".to_string(),
            String::new(),
            record.body.trim().to_string(),
        ]
        .join("\n")
    }

    fn issue_body(&self, marker: &Marker, record: &ChangeRecord) -> String {
        let author = record.author.as_deref().unwrap_or(crate::identity::UNKNOWN_IDENTITY);
        format!(
            "{marker}\n\n{}\n\n_Imported from GitLab issue #{} (author `{author}`, mapped to `{}`, created `{}`)_",
            record.body.trim(),
            record.iid,
            self.identities.map(record.author.as_deref()),
            format_time(record.created_at.as_ref()),
        )
    }

    fn note_body(&self, marker: &Marker, note: &NoteRecord) -> String {
        let author = note.author.as_deref().unwrap_or(crate::identity::UNKNOWN_IDENTITY);
        format!(
            "{marker}\n_Imported GitLab note_\n- Author: `{author}` (mapped to `{}`)\n- Created at: `{}`\n\n{}",
            self.identities.map(note.author.as_deref()),
            format_time(note.created_at.as_ref()),
            note.body.trim()
        )
    }
}

/// Hex-only and of commit-hash length.
fn is_plausible_sha(sha: &str) -> bool {
    (7..=64).contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}
