//! Per end-user-session mutable state.
//!
//! One [`SessionState`] tracks the broker session id plus the current and
//! previous search command. Only search-verb commands touch the command
//! fields; the previous search is only ever the demoted prior value of the
//! current one. The three change predicates drive reinitialization
//! decisions in the engine variants.

use pansearch_protocol::Command;
use tracing::error;

#[derive(Debug, Default, Clone)]
pub struct SessionState {
    broker_session_id: Option<String>,
    current_search: Option<Command>,
    previous_search: Option<Command>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::default()
    }

    pub fn broker_session_id(&self) -> Option<&str> {
        self.broker_session_id.as_deref()
    }

    pub fn bind(&mut self, session_id: String) {
        self.broker_session_id = Some(session_id);
    }

    /// The broker reported this session dead: forget the id, keep the search
    /// provenance so bootstrap can replay it.
    pub fn drop_broker_session(&mut self) {
        self.broker_session_id = None;
    }

    pub fn is_bound(&self) -> bool {
        self.broker_session_id.is_some()
    }

    pub fn current_search(&self) -> Option<&Command> {
        self.current_search.as_ref()
    }

    pub fn previous_search(&self) -> Option<&Command> {
        self.previous_search.as_ref()
    }

    /// Record a new search command, demoting the current one. Accepts only
    /// search-verb commands; anything else is logged and ignored.
    pub fn record_search(&mut self, cmd: Command) {
        if !cmd.verb().is_search() {
            error!(verb = %cmd.verb(), "refusing to record non-search command as search");
            return;
        }
        self.previous_search = self.current_search.take();
        self.current_search = Some(cmd);
    }

    /// Clear search provenance after a fatal application error so the next
    /// search starts from a clean slate. The broker session id is untouched.
    pub fn reset(&mut self) {
        self.current_search = None;
        self.previous_search = None;
    }

    /// Search text changed since the previous search.
    pub fn search_changed(&self) -> bool {
        self.changed(|cmd| cmd.cleaned_query().to_string())
    }

    /// Record filter or its target criteria changed since the previous search.
    pub fn record_filter_changed(&self) -> bool {
        self.changed(|cmd| {
            format!(
                "{}[{}]",
                cmd.record_filter().unwrap_or(""),
                cmd.record_filter_target_criteria().unwrap_or("")
            )
        })
    }

    /// Target-selection query changed since the previous search.
    pub fn targets_changed(&self) -> bool {
        self.changed(|cmd| cmd.target_selection_query().unwrap_or("").to_string())
    }

    /// Compare an attribute of the current search against the previous one.
    /// With no current search nothing has changed; with no previous search
    /// the attribute counts as changed iff it is non-empty on the current.
    fn changed(&self, attr: impl Fn(&Command) -> String) -> bool {
        let Some(current) = &self.current_search else {
            return false;
        };
        match &self.previous_search {
            Some(previous) => attr(current) != attr(previous),
            None => !is_blank(&attr(current)),
        }
    }
}

/// Blank for predicate purposes: empty or the record-filter shape with both
/// halves empty.
fn is_blank(value: &str) -> bool {
    value.is_empty() || value == "[]"
}
