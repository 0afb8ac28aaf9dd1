use bson::Document;

/// Commands the gateway dispatches on, named by the first key of the command
/// document (case-insensitive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Insert,
    Find,
    Update,
    Delete,
    Aggregate,
    Count,
    Drop,
    Hello,
    BuildInfo,
    GetParameter,
    Ping,
    StartSession,
    KillSessions,
    RefreshSessions,
    EndSessions,
    /// Anything else; carries the lower-cased name
    Unknown(String),
}

impl CommandKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "insert" => CommandKind::Insert,
            "find" => CommandKind::Find,
            "update" => CommandKind::Update,
            "delete" => CommandKind::Delete,
            "aggregate" => CommandKind::Aggregate,
            "count" => CommandKind::Count,
            "drop" => CommandKind::Drop,
            "hello" | "ismaster" => CommandKind::Hello,
            "buildinfo" => CommandKind::BuildInfo,
            "getparameter" => CommandKind::GetParameter,
            "ping" => CommandKind::Ping,
            "startsession" => CommandKind::StartSession,
            "killsessions" => CommandKind::KillSessions,
            "refreshsessions" => CommandKind::RefreshSessions,
            "endsessions" => CommandKind::EndSessions,
            _ => CommandKind::Unknown(lower),
        }
    }

    /// Classify a command document by its first key
    pub fn from_document(doc: &Document) -> Self {
        match doc.keys().next() {
            Some(name) => Self::from_name(name),
            None => CommandKind::Unknown(String::new()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CommandKind::Insert => "insert",
            CommandKind::Find => "find",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Aggregate => "aggregate",
            CommandKind::Count => "count",
            CommandKind::Drop => "drop",
            CommandKind::Hello => "hello",
            CommandKind::BuildInfo => "buildinfo",
            CommandKind::GetParameter => "getparameter",
            CommandKind::Ping => "ping",
            CommandKind::StartSession => "startsession",
            CommandKind::KillSessions => "killsessions",
            CommandKind::RefreshSessions => "refreshsessions",
            CommandKind::EndSessions => "endsessions",
            CommandKind::Unknown(name) => name,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
