use std::collections::HashMap;
use std::fmt;

const MARKER_OPEN: &str = "[Imported-from-GitLab:";

/// Token embedded in every object this tool creates on the destination.
///
/// A destination object carrying a marker is the one prior import of exactly
/// that source record; the engine looks for it before creating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    MergeRequest { project_id: u64, iid: u64 },
    Issue { project_id: u64, iid: u64 },
    Note { note_id: u64 },
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MergeRequest { project_id, iid } => {
                write!(f, "{MARKER_OPEN} project_id={project_id} iid={iid}]")
            }
            Self::Issue { project_id, iid } => {
                write!(f, "{MARKER_OPEN} project_id={project_id} issue_iid={iid}]")
            }
            Self::Note { note_id } => write!(f, "{MARKER_OPEN} note_id={note_id}]"),
        }
    }
}

impl Marker {
    pub fn is_in(&self, body: &str) -> bool {
        body.contains(&self.to_string())
    }

    /// Every well-formed marker in `body`, in order of appearance.
    pub fn find_all(body: &str) -> Vec<Marker> {
        let mut markers = Vec::new();
        let mut rest = body;
        while let Some(start) = rest.find(MARKER_OPEN) {
            let after = &rest[start + MARKER_OPEN.len()..];
            let Some(end) = after.find(']') else {
                break;
            };
            if let Some(marker) = Self::parse_fields(&after[..end]) {
                markers.push(marker);
            }
            rest = &after[end + 1..];
        }
        markers
    }

    fn parse_fields(inner: &str) -> Option<Marker> {
        let fields: HashMap<&str, u64> = inner
            .split_whitespace()
            .map(|pair| {
                let (key, value) = pair.split_once('=')?;
                Some((key, value.parse().ok()?))
            })
            .collect::<Option<_>>()?;

        match (
            fields.len(),
            fields.get("project_id"),
            fields.get("iid"),
            fields.get("issue_iid"),
            fields.get("note_id"),
        ) {
            (2, Some(&project_id), Some(&iid), None, None) => {
                Some(Self::MergeRequest { project_id, iid })
            }
            (2, Some(&project_id), None, Some(&iid), None) => Some(Self::Issue { project_id, iid }),
            (1, None, None, None, Some(&note_id)) => Some(Self::Note { note_id }),
            _ => None,
        }
    }
}
