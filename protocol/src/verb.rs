//! Verb classification for broker commands.

/// The command verbs the engine branches on. Anything else is carried as
/// [`Verb::Other`] and forwarded to the broker unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    Search,
    Record,
    Show,
    Bytarget,
    Termlist,
    Stat,
    Ping,
    Init,
    Settings,
    Other(String),
}

/// Verbs whose dead-session recovery replays the previous search before the
/// command itself is retried.
pub const BOOTSTRAP_VERBS: [Verb; 6] = [
    Verb::Record,
    Verb::Bytarget,
    Verb::Show,
    Verb::Termlist,
    Verb::Stat,
    Verb::Ping,
];

impl Verb {
    /// Classify a raw `command` parameter value. Matching is case-sensitive;
    /// an empty value or the literal string `"null"` normalizes to an empty
    /// pass-through verb.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "search" => Verb::Search,
            "record" => Verb::Record,
            "show" => Verb::Show,
            "bytarget" => Verb::Bytarget,
            "termlist" => Verb::Termlist,
            "stat" => Verb::Stat,
            "ping" => Verb::Ping,
            "init" => Verb::Init,
            "settings" => Verb::Settings,
            "null" => Verb::Other(String::new()),
            other => Verb::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verb::Search => "search",
            Verb::Record => "record",
            Verb::Show => "show",
            Verb::Bytarget => "bytarget",
            Verb::Termlist => "termlist",
            Verb::Stat => "stat",
            Verb::Ping => "ping",
            Verb::Init => "init",
            Verb::Settings => "settings",
            Verb::Other(s) => s.as_str(),
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Verb::Search)
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Verb::Record)
    }

    /// Whether dead-session bootstrap should replay the previous search for
    /// this verb. Search itself is excluded: the command being dispatched is
    /// the replay.
    pub fn replays_on_bootstrap(&self) -> bool {
        BOOTSTRAP_VERBS.contains(self)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
