//! Resolution of the tool set an automated run may use.
//!
//! Resolution chain: `orchestrator answer → sentinel check → restrict or fallback → drop create_action`
//!
//! A scheduled run can never pause for confirmation and can never schedule
//! further actions, so both are filtered here rather than trusted to the model.

use actionbot_types::{CREATE_ACTION_TOOL, INVALID_TOOL_PREFIX};

use crate::registry::{ToolRegistry, ToolSet};

/// What the orchestrator said about the tools a task needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSelection {
    /// At least one requested capability has no matching tool.
    Unresolvable(Vec<String>),
    /// A concrete list of tool names.
    Named(Vec<String>),
    /// No opinion; use every tool that does not need confirmation.
    Unspecified,
}

impl ToolSelection {
    /// Interpret the orchestrator's raw answer.
    pub fn from_orchestrator(names: Option<Vec<String>>) -> Self {
        let Some(names) = names.filter(|n| !n.is_empty()) else {
            return ToolSelection::Unspecified;
        };

        let unknown: Vec<String> = names
            .iter()
            .filter_map(|n| n.strip_prefix(INVALID_TOOL_PREFIX))
            .map(|n| n.trim().to_string())
            .collect();
        if !unknown.is_empty() {
            return ToolSelection::Unresolvable(unknown);
        }

        ToolSelection::Named(names)
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, ToolSelection::Unresolvable(_))
    }

    /// Build the read-only tool view for this run.
    ///
    /// Returns `None` for an unresolvable selection.
    pub fn assemble(&self, registry: &ToolRegistry) -> Option<ToolSet> {
        let base = match self {
            ToolSelection::Unresolvable(_) => return None,
            ToolSelection::Named(names) => registry.all().restrict(names),
            ToolSelection::Unspecified => registry.all().without_confirmation(),
        };
        Some(base.without(CREATE_ACTION_TOOL))
    }
}
