//! Console grammar expressed as a static AST.
//!
//! The parser and the `help` command both walk this structure, so keywords,
//! argument layouts and usage strings stay in sync.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Rpm,
    Param,
    Detect,
    Status,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubcommandTag {
    ParamShow,
    ParamSet,
}

/// Positional argument shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgumentSpec {
    /// One-based instance number.
    Instance,
    /// Parameter name.
    ParamName,
    /// `NAME=VALUE`.
    Assignment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelpTopics {
    None,
    Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub help: HelpTopics,
    pub usage: &'static str,
    pub summary: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    Argument {
        spec: ArgumentSpec,
        optional: bool,
        next: &'static Node,
    },
    Subcommands(&'static [SubcommandBranch]),
    Topic {
        topics: HelpTopics,
        next: &'static Node,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubcommandBranch {
    pub name: &'static str,
    pub tag: SubcommandTag,
    pub grammar: &'static Node,
}

const END: Node = Node::End;

const RPM_GRAMMAR: Node = Node::Argument {
    spec: ArgumentSpec::Instance,
    optional: true,
    next: &END,
};

const PARAM_SHOW_GRAMMAR: Node = Node::Argument {
    spec: ArgumentSpec::ParamName,
    optional: true,
    next: &END,
};

const PARAM_SET_GRAMMAR: Node = Node::Argument {
    spec: ArgumentSpec::Assignment,
    optional: false,
    next: &END,
};

const PARAM_SUBCOMMANDS: [SubcommandBranch; 2] = [
    SubcommandBranch {
        name: "show",
        tag: SubcommandTag::ParamShow,
        grammar: &PARAM_SHOW_GRAMMAR,
    },
    SubcommandBranch {
        name: "set",
        tag: SubcommandTag::ParamSet,
        grammar: &PARAM_SET_GRAMMAR,
    },
];

const PARAM_GRAMMAR: Node = Node::Subcommands(&PARAM_SUBCOMMANDS);

const HELP_GRAMMAR: Node = Node::Topic {
    topics: HelpTopics::Commands,
    next: &END,
};

const COMMANDS: [CommandSpec; 5] = [
    CommandSpec {
        name: "rpm",
        tag: CommandTag::Rpm,
        grammar: &RPM_GRAMMAR,
        help: HelpTopics::None,
        usage: "rpm [1-4]",
        summary: "show scaled rate and health for one or all instances",
    },
    CommandSpec {
        name: "param",
        tag: CommandTag::Param,
        grammar: &PARAM_GRAMMAR,
        help: HelpTopics::None,
        usage: "param show [NAME] | param set NAME=VALUE",
        summary: "inspect or tune RPM parameters",
    },
    CommandSpec {
        name: "detect",
        tag: CommandTag::Detect,
        grammar: &END,
        help: HelpTopics::None,
        usage: "detect",
        summary: "re-run sensor detection after type or pin changes",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        help: HelpTopics::None,
        usage: "status",
        summary: "summarize active sensors and pre-arm checks",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        help: HelpTopics::Commands,
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Rpm => &COMMANDS[0],
        CommandTag::Param => &COMMANDS[1],
        CommandTag::Detect => &COMMANDS[2],
        CommandTag::Status => &COMMANDS[3],
        CommandTag::Help => &COMMANDS[4],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_resolve_to_matching_entries() {
        for spec in commands() {
            assert_eq!(command(spec.tag).name, spec.name);
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find("PARAM").map(|spec| spec.tag), Some(CommandTag::Param));
        assert!(find("reboot").is_none());
    }
}
