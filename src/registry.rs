//! Command registry and help text
//!
//! Each command is described by a [`CommandDescriptor`] (name, arguments,
//! examples, aliases) and keyed to a handler through [`CommandId`]. The
//! registry is built once at startup and handed to the dispatcher.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::BotConfig;

/// Choice lists longer than this are truncated in help
const MAX_CHOICES_SHOWN: usize = 10;
const MAX_SUGGESTIONS: usize = 5;

/// Handler key for a registered command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    Help,
    Hello,
    AwsVmCreate,
    AwsVmList,
    AwsVmModify,
    OpenStackVmCreate,
    OpenStackVmList,
    OpenStackVmModify,
    ProjectLinksList,
    Rota,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("command name {0:?} is already registered")]
    Duplicate(String),
    #[error("command name is empty")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Bool,
}

/// Allowed values for an argument, shown in help
#[derive(Clone)]
pub enum Choices {
    Static(Vec<String>),
    /// Resolved against config at render time
    Dynamic(fn(&BotConfig) -> Vec<String>),
}

impl Choices {
    pub fn of(values: &[&str]) -> Self {
        Choices::Static(values.iter().map(|s| s.to_string()).collect())
    }

    pub fn resolve(&self, config: &BotConfig) -> Vec<String> {
        match self {
            Choices::Static(values) => values.clone(),
            Choices::Dynamic(source) => source(config),
        }
    }
}

impl std::fmt::Debug for Choices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choices::Static(values) => f.debug_tuple("Static").field(values).finish(),
            Choices::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub kind: ArgKind,
    pub choices: Option<Choices>,
    pub default: Option<String>,
}

impl ArgSpec {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
            kind: ArgKind::Str,
            choices: None,
            default: None,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }

    pub fn flag(name: &str, description: &str) -> Self {
        Self {
            kind: ArgKind::Bool,
            ..Self::optional(name, description)
        }
    }

    pub fn choices(mut self, choices: Choices) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }
}

/// Help metadata for one command
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    /// Canonical name, may span several words ("aws vm list")
    pub name: String,
    pub command: CommandId,
    pub description: String,
    pub arguments: Vec<ArgSpec>,
    pub examples: Vec<String>,
    pub aliases: Vec<String>,
}

impl CommandDescriptor {
    pub fn new(name: &str, command: CommandId, description: &str) -> Self {
        Self {
            name: name.to_string(),
            command,
            description: description.to_string(),
            arguments: Vec::new(),
            examples: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.arguments.push(arg);
        self
    }

    pub fn example(mut self, example: &str) -> Self {
        self.examples.push(example.to_string());
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    /// `name <required> [optional]`, used in the overview
    pub fn short_usage(&self) -> String {
        let mut parts = vec![self.name.clone()];
        for arg in &self.arguments {
            if arg.required {
                parts.push(format!("<{}>", arg.name));
            } else {
                parts.push(format!("[{}]", arg.name));
            }
        }
        parts.join(" ")
    }

    /// `name --req=<req> [--opt=<opt>]`, used in detailed help
    pub fn usage(&self) -> String {
        let mut parts = vec![self.name.clone()];
        for arg in &self.arguments {
            if arg.required {
                parts.push(format!("--{0}=<{0}>", arg.name));
            } else {
                parts.push(format!("[--{0}=<{0}>]", arg.name));
            }
        }
        parts.join(" ")
    }
}

/// Registered commands, addressable by name or alias
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandDescriptor>,
    index: HashMap<String, usize>,
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte spans of whitespace-separated words
fn word_spans(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, line.len()));
    }
    spans
}

fn greeting(user: Option<&str>) -> String {
    match user {
        Some(user) => format!("Hello <@{}>! ", user),
        None => "Hello! ".to_string(),
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard bot commands
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for descriptor in default_commands() {
            if let Err(e) = registry.register(descriptor) {
                tracing::error!("skipping default command: {}", e);
            }
        }
        registry
    }

    /// Register a command under its name and all aliases
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), RegistryError> {
        let keys: Vec<String> = std::iter::once(&descriptor.name)
            .chain(&descriptor.aliases)
            .map(|n| normalize_name(n))
            .collect();

        for (i, key) in keys.iter().enumerate() {
            if key.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if self.index.contains_key(key) || keys[..i].contains(key) {
                return Err(RegistryError::Duplicate(key.clone()));
            }
        }

        let idx = self.commands.len();
        self.commands.push(descriptor);
        for key in keys {
            self.index.insert(key, idx);
        }
        Ok(())
    }

    /// Find a command by name or alias (case and spacing insensitive)
    pub fn lookup(&self, name: &str) -> Option<&CommandDescriptor> {
        self.index
            .get(&normalize_name(name))
            .map(|&idx| &self.commands[idx])
    }

    /// All registered names and aliases, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered commands in registration order (aliases not repeated)
    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Longest registered name that `line` starts with, on word boundaries.
    ///
    /// Returns the descriptor and the remainder of the line after the name.
    pub fn match_prefix<'a>(&'a self, line: &'a str) -> Option<(&'a CommandDescriptor, &'a str)> {
        let spans = word_spans(line);
        let mut best: Option<(usize, usize)> = None;

        for (key, &idx) in &self.index {
            let words: Vec<&str> = key.split(' ').collect();
            if words.len() > spans.len() {
                continue;
            }
            let matched = words
                .iter()
                .zip(&spans)
                .all(|(word, &(start, end))| line[start..end].eq_ignore_ascii_case(word));
            if matched && best.map_or(true, |(len, _)| words.len() > len) {
                best = Some((words.len(), idx));
            }
        }

        let (len, idx) = best?;
        let end = spans[len - 1].1;
        Some((&self.commands[idx], line[end..].trim()))
    }

    /// Help for one command; `detailed` adds usage, arguments, examples
    pub fn format_command_help(&self, name: &str, detailed: bool, config: &BotConfig) -> String {
        let Some(cmd) = self.lookup(name) else {
            return format!("Command '{}' not found.", name);
        };

        if !detailed {
            return format!("`{}` - {}", cmd.name, cmd.description);
        }

        let mut lines = vec![
            format!("*{}*", cmd.name),
            format!("_{}_", cmd.description),
            String::new(),
        ];

        if !cmd.arguments.is_empty() {
            lines.push(format!("*Usage:* `{}`", cmd.usage()));
            lines.push(String::new());
            lines.push("*Arguments:*".to_string());
            for arg in &cmd.arguments {
                let mut line = format!("  `--{}`", arg.name);
                if arg.required {
                    line.push_str(" *(required)*");
                }
                line.push_str(&format!(" - {}", arg.description));

                if let Some(choices) = &arg.choices {
                    let values = choices.resolve(config);
                    if values.len() > MAX_CHOICES_SHOWN {
                        line.push_str(&format!(
                            " (Options: {}, ...)",
                            values[..MAX_CHOICES_SHOWN].join(", ")
                        ));
                    } else if !values.is_empty() {
                        line.push_str(&format!(" (Options: {})", values.join(", ")));
                    }
                }
                if let Some(default) = &arg.default {
                    line.push_str(&format!(" (Default: {})", default));
                }
                lines.push(line);
            }
            lines.push(String::new());
        }

        if !cmd.examples.is_empty() {
            lines.push("*Examples:*".to_string());
            for example in &cmd.examples {
                lines.push(format!("  `{}`", example));
            }
            lines.push(String::new());
        }

        if !cmd.aliases.is_empty() {
            lines.push(format!("*Aliases:* {}", cmd.aliases.join(", ")));
        }

        lines.join("\n").trim().to_string()
    }

    /// Overview of every command
    pub fn help_overview(&self, user: Option<&str>) -> String {
        let mut commands: Vec<&CommandDescriptor> = self.commands.iter().collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));

        let mut lines = vec![
            format!("{}Here's what I can help you with:\n", greeting(user)),
            "*Available Commands:*".to_string(),
        ];
        for cmd in commands {
            lines.push(format!("`{}` - {}", cmd.short_usage(), cmd.description));
        }
        lines.extend([
            String::new(),
            "For detailed help on any command, use: `help <command-name>` or `<command-name> --help`"
                .to_string(),
            String::new(),
            "Example: `help openstack vm create` or `openstack vm create --help`".to_string(),
        ]);
        lines.join("\n")
    }

    /// Detailed help for `name`, with suggestions when it isn't registered
    pub fn help_for(&self, user: Option<&str>, name: &str, config: &BotConfig) -> String {
        if let Some(cmd) = self.lookup(name) {
            return format!(
                "{}Here's help for `{}`:\n\n{}",
                greeting(user),
                cmd.name,
                self.format_command_help(name, true, config)
            );
        }

        let needle = name.to_lowercase();
        let suggestions: Vec<&str> = self
            .names()
            .into_iter()
            .filter(|n| n.contains(&needle))
            .take(MAX_SUGGESTIONS)
            .collect();

        if suggestions.is_empty() {
            format!(
                "{}Command `{}` not found. Use `help` to see all available commands.",
                greeting(user),
                name
            )
        } else {
            format!(
                "{}Command `{}` not found. Did you mean: {}?",
                greeting(user),
                name,
                suggestions.join(", ")
            )
        }
    }
}

fn openstack_os_names(config: &BotConfig) -> Vec<String> {
    config.openstack.images.keys().cloned().collect()
}

fn openstack_flavors(config: &BotConfig) -> Vec<String> {
    config.openstack.flavors.clone()
}

fn aws_instance_types(config: &BotConfig) -> Vec<String> {
    config.aws.instance_types.clone()
}

pub const OPENSTACK_STATUSES: &[&str] = &["ACTIVE", "SHUTOFF", "ERROR"];

pub const AWS_INSTANCE_STATES: &[&str] = &[
    "pending",
    "running",
    "shutting-down",
    "terminated",
    "stopping",
    "stopped",
];

/// The commands the bot ships with
pub fn default_commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new("help", CommandId::Help, "Show help information for commands")
            .arg(ArgSpec::optional("command", "Specific command to get help for"))
            .example("help")
            .example("help openstack vm create"),
        CommandDescriptor::new("hello", CommandId::Hello, "Greet the bot").example("hello"),
        CommandDescriptor::new(
            "openstack vm create",
            CommandId::OpenStackVmCreate,
            "Create an OpenStack VM with specified configuration",
        )
        .arg(ArgSpec::required("name", "Name for the VM"))
        .arg(
            ArgSpec::required("os_name", "Operating system name")
                .choices(Choices::Dynamic(openstack_os_names)),
        )
        .arg(
            ArgSpec::required("flavor", "VM flavor/size (e.g., ci.cpu.small)")
                .choices(Choices::Dynamic(openstack_flavors)),
        )
        .arg(
            ArgSpec::required("key_pair", "Whether to use new or existing keypair")
                .choices(Choices::of(&["new", "existing"])),
        )
        .example("openstack vm create --name=myvm --os_name=fedora --flavor=ci.cpu.small --key_pair=new"),
        CommandDescriptor::new(
            "openstack vm list",
            CommandId::OpenStackVmList,
            "List OpenStack VMs with optional status filtering",
        )
        .arg(
            ArgSpec::optional("status", "Filter VMs by status")
                .choices(Choices::of(OPENSTACK_STATUSES))
                .default_value("ACTIVE"),
        )
        .example("openstack vm list")
        .example("openstack vm list --status=ACTIVE")
        .example("openstack vm list --status=SHUTOFF"),
        CommandDescriptor::new(
            "openstack vm modify",
            CommandId::OpenStackVmModify,
            "Stop, start, or delete OpenStack VMs",
        )
        .arg(ArgSpec::required("vm-id", "Server ID to modify"))
        .arg(ArgSpec::flag("stop", "Stop the server"))
        .arg(ArgSpec::flag("start", "Start the server"))
        .arg(ArgSpec::flag("delete", "Delete the server"))
        .example("openstack vm modify --stop --vm-id=abc123-def456-ghi789")
        .example("openstack vm modify --start --vm-id=abc123-def456-ghi789")
        .example("openstack vm modify --delete --vm-id=abc123-def456-ghi789"),
        CommandDescriptor::new(
            "aws vm create",
            CommandId::AwsVmCreate,
            "Create an AWS EC2 instance",
        )
        .arg(ArgSpec::required("os_name", "Operating system name").choices(Choices::of(&["linux"])))
        .arg(
            ArgSpec::required("instance_type", "EC2 instance type")
                .choices(Choices::Dynamic(aws_instance_types)),
        )
        .arg(
            ArgSpec::required("key_pair", "Key pair option")
                .choices(Choices::of(&["new", "existing"])),
        )
        .example("aws vm create --os_name=linux --instance_type=t2.micro --key_pair=new")
        .example("aws vm create --os_name=linux --instance_type=t3.small --key_pair=existing"),
        CommandDescriptor::new(
            "aws vm list",
            CommandId::AwsVmList,
            "List AWS EC2 instances with optional filtering",
        )
        .arg(
            ArgSpec::optional("state", "Filter instances by state")
                .choices(Choices::of(AWS_INSTANCE_STATES)),
        )
        .arg(
            ArgSpec::optional("type", "Filter instances by type")
                .choices(Choices::Dynamic(aws_instance_types)),
        )
        .arg(ArgSpec::optional("instance-ids", "Comma-separated list of instance IDs"))
        .example("aws vm list")
        .example("aws vm list --state=running,stopped")
        .example("aws vm list --type=t2.micro,t3.small")
        .example("aws vm list --instance-ids=i-123456,i-789012"),
        CommandDescriptor::new(
            "aws vm modify",
            CommandId::AwsVmModify,
            "Stop or delete AWS EC2 instances",
        )
        .arg(ArgSpec::required("vm-id", "Instance ID to modify"))
        .arg(ArgSpec::flag("stop", "Stop the instance"))
        .arg(ArgSpec::flag("delete", "Delete the instance"))
        .example("aws vm modify --stop --vm-id=i-1234567890abcdef0")
        .example("aws vm modify --delete --vm-id=i-1234567890abcdef0"),
        CommandDescriptor::new(
            "project links list",
            CommandId::ProjectLinksList,
            "Display important team links",
        )
        .example("project links list"),
        CommandDescriptor::new(
            "rota",
            CommandId::Rota,
            "Manage release rotation assignments in Google Sheets",
        )
        .arg(
            ArgSpec::required("action", "Action to perform, given as a flag")
                .choices(Choices::of(&["add", "check", "replace"])),
        )
        .arg(ArgSpec::optional("release", "Release version (e.g., 4.15.1)"))
        .arg(ArgSpec::optional("start", "Start date in YYYY-MM-DD format (must be a Monday)"))
        .arg(ArgSpec::optional("end", "End date in YYYY-MM-DD format (must be a Friday)"))
        .arg(ArgSpec::optional("pm", "Project Manager username"))
        .arg(ArgSpec::optional("qe1", "Primary QE engineer username"))
        .arg(ArgSpec::optional("qe2", "Secondary QE engineer username"))
        .arg(
            ArgSpec::optional("time", "Time period to check")
                .choices(Choices::of(&["This Week", "Next Week"])),
        )
        .arg(
            ArgSpec::optional("column", "Column to replace")
                .choices(Choices::of(&["pm", "qe1", "qe2"])),
        )
        .arg(ArgSpec::optional("user", "Replacement user; omit to clear"))
        .example("rota --add --release=4.15.1 --start=2024-01-08 --end=2024-01-12 --pm=john.doe --qe1=jane.smith --qe2=bob.wilson")
        .example("rota --check --time='This Week'")
        .example("rota --check --release=4.15.1")
        .example("rota --replace --release=4.15.1 --column=pm --user=new.person"),
    ]
}
