use std::fmt;

use serde_json::Value;
use thiserror::Error;

use bluesky_client::Post;

use crate::filter::FilterResult;
use crate::task::{parse_posts, Task};

/// Search window used when a task carries no `since`.
pub const DEFAULT_WINDOW_SECS: u64 = 3600;

/// The closed set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Search,
    Filter,
    Hydrate,
    Deliver,
    Tutti,
}

const STAGE_TABLE: [(&str, StageKind); 5] = [
    ("MonitorBluesky", StageKind::Search),
    ("MonitorGemini", StageKind::Filter),
    ("MonitorHydrate", StageKind::Hydrate),
    ("MonitorSlack", StageKind::Deliver),
    ("TuttiMonitor", StageKind::Tutti),
];

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Search,
        StageKind::Filter,
        StageKind::Hydrate,
        StageKind::Deliver,
        StageKind::Tutti,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        STAGE_TABLE
            .iter()
            .find(|(stage, _)| *stage == name)
            .map(|(_, kind)| *kind)
    }

    /// Wire name, also used as the talkback operation.
    pub fn name(self) -> &'static str {
        STAGE_TABLE[self.index()].0
    }

    pub(crate) fn index(self) -> usize {
        match self {
            StageKind::Search => 0,
            StageKind::Filter => 1,
            StageKind::Hydrate => 2,
            StageKind::Deliver => 3,
            StageKind::Tutti => 4,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchInput {
    pub keywords: Vec<String>,
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterInput {
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HydrateInput {
    pub filter: FilterResult,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverInput {
    /// Output of the latest `MonitorHydrate` stage, when the sequence has one.
    pub hydrated: Option<Value>,
}

/// A stage with its inputs already pulled out of the task context.
#[derive(Debug, Clone, PartialEq)]
pub enum StageRequest {
    Search(SearchInput),
    Filter(FilterInput),
    Hydrate(HydrateInput),
    Deliver(DeliverInput),
    Tutti(SearchInput),
}

impl StageRequest {
    pub fn kind(&self) -> StageKind {
        match self {
            StageRequest::Search(_) => StageKind::Search,
            StageRequest::Filter(_) => StageKind::Filter,
            StageRequest::Hydrate(_) => StageKind::Hydrate,
            StageRequest::Deliver(_) => StageKind::Deliver,
            StageRequest::Tutti(_) => StageKind::Tutti,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown stage {0:?}")]
    UnknownStage(String),
}

/// Unit of pool work: one stage plus where to report its output.
#[derive(Debug, Clone, PartialEq)]
pub struct StageJob {
    pub talkback: String,
    pub slug: String,
    pub request: StageRequest,
}

impl StageJob {
    /// Resolve a task's name against the stage table and extract the inputs
    /// that stage reads.
    pub fn resolve(task: Task) -> Result<Self, ResolveError> {
        let kind =
            StageKind::from_name(&task.name).ok_or_else(|| ResolveError::UnknownStage(task.name.clone()))?;
        let search_posts = || parse_posts(task.stage_output(StageKind::Search.name()));

        let request = match kind {
            StageKind::Search => StageRequest::Search(search_input(&task)),
            StageKind::Tutti => StageRequest::Tutti(search_input(&task)),
            StageKind::Filter => StageRequest::Filter(FilterInput {
                posts: search_posts(),
            }),
            StageKind::Hydrate => StageRequest::Hydrate(HydrateInput {
                filter: task
                    .stage_output(StageKind::Filter.name())
                    .cloned()
                    .map(FilterResult::from_model_output)
                    .unwrap_or_default(),
                posts: search_posts(),
            }),
            StageKind::Deliver => StageRequest::Deliver(DeliverInput {
                hydrated: task.stage_output(StageKind::Hydrate.name()).cloned(),
            }),
        };

        Ok(Self {
            slug: task.playlist.slug,
            talkback: task.talkback,
            request,
        })
    }

    pub fn kind(&self) -> StageKind {
        self.request.kind()
    }
}

fn search_input(task: &Task) -> SearchInput {
    let metadata = task.context.metadata.as_ref();
    SearchInput {
        keywords: metadata.map(|m| m.search_terms()).unwrap_or_default(),
        window_secs: metadata
            .and_then(|m| m.since)
            .unwrap_or(DEFAULT_WINDOW_SECS),
    }
}
