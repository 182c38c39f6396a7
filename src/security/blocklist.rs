// src/security/blocklist.rs - Shell command blocklist

/// Case-insensitive substring blocklist for `/run`.
#[derive(Debug, Clone, Default)]
pub struct CommandBlocklist {
    patterns: Vec<String>,
}

impl CommandBlocklist {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The first pattern the command matches, if any.
    pub fn matched(&self, command: &str) -> Option<&str> {
        let lower = command.trim().to_lowercase();
        self.patterns
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn is_blocked(&self, command: &str) -> bool {
        self.matched(command).is_some()
    }
}
