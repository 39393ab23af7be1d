/// Command registry: every command the bot answers to.
use crate::types::{ArgType, CommandArg, CommandDef};

fn days_arg() -> CommandArg {
    CommandArg {
        name: "days".into(),
        description: "Threshold for inactivity in days (default 30)".into(),
        arg_type: ArgType::Integer,
        required: false,
    }
}

fn member_arg(description: &str) -> CommandArg {
    CommandArg {
        name: "member".into(),
        description: description.into(),
        arg_type: ArgType::Member,
        required: true,
    }
}

fn def(key: &str, description: &str, args: Vec<CommandArg>, admin_only: bool) -> CommandDef {
    CommandDef {
        key: key.into(),
        description: description.into(),
        text_aliases: vec![],
        args,
        admin_only,
        public_reply: false,
    }
}

pub fn builtin_commands() -> Vec<CommandDef> {
    vec![
        def("inactive", "List members who have been inactive for the given number of days.", vec![days_arg()], false),
        CommandDef {
            public_reply: true,
            ..def("kick_inactive", "Kick members who have been inactive for the given number of days.", vec![days_arg()], true)
        },
        def("lastseen", "Show when a member was last active.", vec![member_arg("The member to look up")], false),
        CommandDef {
            text_aliases: vec!["status".into()],
            ..def("sync_status", "Show whether message history is fully synced.", vec![], false)
        },
        CommandDef {
            text_aliases: vec!["whitelist".into()],
            ..def("whitelist_show", "Show the whitelist.", vec![], true)
        },
        def("whitelist_add", "Add a member to the whitelist.", vec![member_arg("The member to add")], true),
        def("whitelist_remove", "Remove a member from the whitelist.", vec![member_arg("The member to remove")], true),
    ]
}

pub struct CommandRegistry {
    commands: Vec<CommandDef>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { commands: builtin_commands() }
    }

    pub fn all(&self) -> &[CommandDef] {
        &self.commands
    }

    /// Find a command by key or text alias.
    pub fn find(&self, name: &str) -> Option<&CommandDef> {
        self.commands.iter().find(|c| c.answers_to(name))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_and_valid_slash_names() {
        let registry = CommandRegistry::new();
        let mut keys: Vec<_> = registry.all().iter().map(|c| c.key.as_str()).collect();
        for key in &keys {
            assert!(key.len() <= 32 && key.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), registry.all().len());
    }

    #[test]
    fn moderation_and_whitelist_are_admin_only() {
        let registry = CommandRegistry::new();
        for key in ["kick_inactive", "whitelist_show", "whitelist_add", "whitelist_remove"] {
            assert!(registry.find(key).unwrap().admin_only, "{key}");
        }
        for key in ["inactive", "lastseen", "sync_status"] {
            assert!(!registry.find(key).unwrap().admin_only, "{key}");
        }
    }

    #[test]
    fn aliases_resolve() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.find("status").unwrap().key, "sync_status");
        assert_eq!(registry.find("Whitelist").unwrap().key, "whitelist_show");
        assert!(registry.find("ban").is_none());
    }
}
