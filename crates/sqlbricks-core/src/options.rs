//! Descriptors for the options an adapter recognizes
//!
//! Hosts turn these into CLI flags or config-file keys. Names use
//! kebab-case; config files may use either kebab-case or snake_case.

/// How an option's value is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Free text
    Text,

    /// Boolean switch (present means true)
    Flag,

    /// Filesystem path, `~` allowed
    Path,

    /// One of a fixed set of values
    Select(&'static [&'static str]),
}

/// A single recognized adapter option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOption {
    /// Option name (kebab-case)
    pub name: &'static str,

    /// Help text
    pub description: &'static str,

    /// Value kind
    pub kind: OptionKind,
}

impl AdapterOption {
    pub const fn new(name: &'static str, description: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            description,
            kind,
        }
    }

    /// Key used in snake_case config files and option maps
    pub fn key(&self) -> String {
        self.name.replace('-', "_")
    }

    /// Check a value against a `Select` option's choices
    pub fn accepts(&self, value: &str) -> bool {
        match self.kind {
            OptionKind::Select(choices) => choices.iter().any(|c| *c == value),
            _ => true,
        }
    }
}

/// Find an option by kebab-case or snake_case name
pub fn find_option<'a>(options: &'a [AdapterOption], name: &str) -> Option<&'a AdapterOption> {
    let wanted = name.replace('_', "-");
    options.iter().find(|o| o.name == wanted)
}
