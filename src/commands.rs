//! Chat command implementations

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use tracing::{error, info, instrument, warn};

use crate::cloud::{ComputeProvider, CreateRequest, InstanceFilter};
use crate::display::{instance_table, Reply};
use crate::interp::{self, Input};
use crate::ops::{self, KeyOption, KeySelection, ModifyAction};
use crate::params::{self, Params};
use crate::registry::{CommandDescriptor, CommandId, OPENSTACK_STATUSES};
use crate::rota::{schedule_problems, NewRelease, RotaError, RotaRow};
use crate::state::SharedState;

/// Get or create the command counter
fn command_counter() -> opentelemetry::metrics::Counter<u64> {
    static COUNTER: std::sync::OnceLock<opentelemetry::metrics::Counter<u64>> =
        std::sync::OnceLock::new();
    COUNTER
        .get_or_init(|| {
            opentelemetry::global::meter("opsbot")
                .u64_counter("opsbot.commands.total")
                .with_description("Total number of chat commands executed")
                .build()
        })
        .clone()
}

const AWS_LIST_COLUMNS: &[&str] = &[
    "instance_id",
    "name",
    "instance_type",
    "state",
    "public_ip",
    "private_ip",
];
const AWS_CREATE_COLUMNS: &[&str] = &[
    "name",
    "instance_id",
    "key_name",
    "instance_type",
    "public_ip",
];
const OPENSTACK_LIST_COLUMNS: &[&str] = &[
    "server_id",
    "name",
    "flavor",
    "network",
    "private_ip",
    "key_name",
    "status",
];
const OPENSTACK_CREATE_COLUMNS: &[&str] = &[
    "name",
    "server_id",
    "key_name",
    "flavor",
    "network",
    "status",
    "private_ip",
];

const AWS_CREATE_REQUIRED: &[(&str, &str)] = &[
    ("os_name", "--os_name"),
    ("instance_type", "--instance_type"),
    ("key_pair", "--key_pair"),
];

const INTERNAL_ERROR: &str = ":x: An internal error occurred, please contact administrator.";

/// Chat front end: one message in, replies out
#[derive(Clone)]
pub struct Bot {
    state: Arc<SharedState>,
}

impl Bot {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    #[instrument(name = "cmd.dispatch", skip(self, text), fields(input.len = text.len()))]
    pub async fn handle_message(&self, user: &str, text: &str) -> Vec<Reply> {
        let bot_name = &self.state.config.bot_name;
        let (command, args, help) = match interp::parse(&self.state.registry, text, bot_name) {
            Input::Command {
                command,
                args,
                help,
            } => (command, args, help),
            Input::Unknown(rest) => {
                info!(input = rest, "unrecognized command");
                return vec![Reply::say(not_understood(user))];
            }
            Input::Empty => return vec![Reply::say(not_understood(user))],
        };

        command_counter().add(1, &[KeyValue::new("command", command.name.clone())]);

        let params = params::parse(args);
        if help || params.contains("help") || params.contains("h") {
            return vec![Reply::say(self.state.registry.help_for(
                Some(user),
                &command.name,
                &self.state.config,
            ))];
        }

        match self.run(command, user, args, &params).await {
            Ok(replies) => replies,
            Err(e) => {
                error!(command = %command.name, user, "command failed: {:#}", e);
                vec![Reply::say(INTERNAL_ERROR)]
            }
        }
    }

    async fn run(
        &self,
        command: &CommandDescriptor,
        user: &str,
        args: &str,
        params: &Params,
    ) -> Result<Vec<Reply>> {
        match command.command {
            CommandId::Hello => Ok(vec![Reply::say(format!(
                "Hello <@{}>! How can I assist you today?",
                user
            ))]),
            CommandId::Help => Ok(vec![Reply::say(self.cmd_help(user, args))]),
            CommandId::AwsVmList => self.cmd_aws_vm_list(params).await,
            CommandId::AwsVmCreate => self.cmd_aws_vm_create(user, params).await,
            CommandId::AwsVmModify => self.cmd_aws_vm_modify(params).await,
            CommandId::OpenStackVmCreate => self.cmd_openstack_vm_create(user, params).await,
            CommandId::OpenStackVmList => self.cmd_openstack_vm_list(params).await,
            CommandId::OpenStackVmModify => self.cmd_openstack_vm_modify(params).await,
            CommandId::ProjectLinksList => Ok(self.cmd_project_links()),
            CommandId::Rota => self.cmd_rota(user, params).await,
        }
    }

    fn cmd_help(&self, user: &str, args: &str) -> String {
        let name = args.trim();
        if name.is_empty() {
            self.state.registry.help_overview(Some(user))
        } else {
            self.state
                .registry
                .help_for(Some(user), name, &self.state.config)
        }
    }

    // --- AWS ---

    async fn cmd_aws_vm_list(&self, params: &Params) -> Result<Vec<Reply>> {
        let filter = ops::aws_filter(params);
        let instances = self
            .state
            .aws
            .list_instances(&filter)
            .await
            .context("failed to list EC2 instances")?;

        if instances.is_empty() {
            let text = if filter.is_empty() {
                "There are currently no EC2 instances to retrieve"
            } else {
                "There are currently no EC2 instances available that match the specified criteria"
            };
            return Ok(vec![Reply::say(text)]);
        }

        Ok(instance_table(
            " Here are the requested VM instances:",
            &instances,
            AWS_LIST_COLUMNS,
        ))
    }

    async fn cmd_aws_vm_create(&self, user: &str, params: &Params) -> Result<Vec<Reply>> {
        let os_name = params.non_empty("os_name");
        let instance_type = params.non_empty("instance_type");
        let key_pair = params.non_empty("key_pair");

        let (Some(os_name), Some(instance_type), Some(key_pair)) =
            (os_name, instance_type, key_pair)
        else {
            let missing = missing_params(params, AWS_CREATE_REQUIRED);
            return Ok(vec![Reply::say(format!(
                ":warning: Missing required parameters: {}. Usage: `aws vm create --os_name=linux --instance_type=t2.micro --key_pair=new`",
                missing
            ))]);
        };

        let Some(option) = KeyOption::parse(key_pair) else {
            return Ok(vec![Reply::say(
                ":warning: `key_pair` should be either `new` or `existing`.",
            )]);
        };

        if !os_name.eq_ignore_ascii_case("linux") {
            return Ok(vec![Reply::say(format!(
                ":x: Unsupported OS name: `{}`. Only `linux` is supported.",
                os_name
            ))]);
        }

        let aws = &self.state.config.aws;
        let mut replies = vec![Reply::say(format!(
            ":hourglass_flowing_sand: Creating an EC2 instance of type `{}` in `{}`...",
            instance_type, aws.region
        ))];

        let Some(selection) = self
            .keypair_replies(self.state.aws.as_ref(), user, option, &mut replies, |material| {
                format!(
                    "New key created:\n```{}```\nCloud: AWS, OS: {}, Instance type: {}",
                    material, os_name, instance_type
                )
            })
            .await?
        else {
            return Ok(replies);
        };

        let request = CreateRequest {
            name: None,
            image: aws.linux_ami.clone(),
            instance_type: instance_type.to_string(),
            key_name: selection.key.name.clone(),
            network: None,
        };
        let instance = match self.state.aws.create_instance(&request).await {
            Ok(instance) => instance,
            Err(e) => {
                error!(user, instance_type, "EC2 instance creation failed: {}", e);
                replies.push(Reply::say(":x: *EC2 instance creation failed.*"));
                return Ok(replies);
            }
        };
        info!(user, instance_id = %instance.id, "created EC2 instance");

        replies.push(Reply::say(":white_check_mark: *Successfully created EC2 instance!*"));
        replies.extend(instance_table(
            " Instance details:",
            std::slice::from_ref(&instance),
            AWS_CREATE_COLUMNS,
        ));
        replies.push(Reply::say(ssh_instructions(
            &selection,
            &aws.ssh_user,
            instance.public_ip.as_deref().unwrap_or("<public_ip>"),
        )));
        Ok(replies)
    }

    async fn cmd_aws_vm_modify(&self, params: &Params) -> Result<Vec<Reply>> {
        let Some(vm_id) = params.non_empty("vm-id") else {
            return Ok(vec![Reply::say(
                ":warning: Please provide the instance id with `--vm-id`.",
            )]);
        };

        let allowed = [ModifyAction::Stop, ModifyAction::Delete];
        let action = match ModifyAction::requested(params, &allowed).as_slice() {
            [action] => *action,
            [] => {
                return Ok(vec![Reply::say(
                    ":warning: Please specify an action: `--stop` or `--delete`.",
                )])
            }
            _ => {
                return Ok(vec![Reply::say(
                    ":warning: Please use only one of `--stop` or `--delete`.",
                )])
            }
        };

        let mut replies = vec![match action {
            ModifyAction::Delete => Reply::say(format!(
                ":warning: Terminating instance `{}`. This cannot be undone.",
                vm_id
            )),
            _ => Reply::say(format!(
                ":hourglass_flowing_sand: Stopping instance `{}`...",
                vm_id
            )),
        }];

        match ops::modify_instance(self.state.aws.as_ref(), vm_id, action).await {
            Ok(change) => replies.push(Reply::say(format!(
                ":white_check_mark: Instance `{}` is changing state: *{}* -> *{}*",
                change.id, change.previous_state, change.current_state
            ))),
            Err(e) => {
                warn!(vm_id, action = action.flag(), "EC2 modify failed: {:#}", e);
                replies.push(Reply::say(format!(
                    ":x: *Failed to {} instance `{}`*: {}",
                    action.flag(),
                    vm_id,
                    e.root_cause()
                )));
            }
        }
        Ok(replies)
    }

    // --- OpenStack ---

    async fn cmd_openstack_vm_create(&self, user: &str, params: &Params) -> Result<Vec<Reply>> {
        let config = &self.state.config.openstack;
        let name = params.non_empty("name");
        let os_name = params.non_empty("os_name");
        let flavor = params.non_empty("flavor");
        let key_pair = params.non_empty("key_pair");

        let (Some(name), Some(os_name), Some(flavor), Some(key_pair)) =
            (name, os_name, flavor, key_pair)
        else {
            let missing = missing_params(
                params,
                &[
                    ("name", "--name"),
                    ("os_name", "--os_name"),
                    ("flavor", "--flavor"),
                    ("key_pair", "--key_pair"),
                ],
            );
            let supported: Vec<&str> = config.images.keys().map(String::as_str).collect();
            return Ok(vec![Reply::say(format!(
                ":warning: Missing required parameters: {}. Supported OS names: {}",
                missing,
                supported.join(", ")
            ))]);
        };

        let Some(image) = config.image_for(os_name) else {
            let supported: Vec<&str> = config.images.keys().map(String::as_str).collect();
            return Ok(vec![Reply::say(format!(
                ":x: Unsupported OS name: `{}`. Supported OS names: {}",
                os_name,
                supported.join(", ")
            ))]);
        };

        let Some(network) = config.default_network_id() else {
            error!(network = %config.default_network, "default network has no id configured");
            return Ok(vec![Reply::say(format!(
                ":x: Network `{}` is not configured.",
                config.default_network
            ))]);
        };

        let Some(option) = KeyOption::parse(key_pair) else {
            return Ok(vec![Reply::say(
                ":warning: `key_pair` should either be `new` or `existing`.",
            )]);
        };

        let mut replies = vec![Reply::say(format!(
            ":hourglass_flowing_sand: Creating OpenStack VM `{}` with flavor `{}`...",
            name, flavor
        ))];

        let Some(selection) = self
            .keypair_replies(
                self.state.openstack.as_ref(),
                user,
                option,
                &mut replies,
                |material| {
                    format!(
                        "New key created:\n```{}```\nCloud: OpenStack, OS: {}, Flavor: {}",
                        material, os_name, flavor
                    )
                },
            )
            .await?
        else {
            return Ok(replies);
        };

        let request = CreateRequest {
            name: Some(name.to_string()),
            image: image.to_string(),
            instance_type: flavor.to_string(),
            key_name: selection.key.name.clone(),
            network: Some(network.to_string()),
        };
        let server = match self.state.openstack.create_instance(&request).await {
            Ok(server) => server,
            Err(e) => {
                error!(user, name, "OpenStack VM creation failed: {}", e);
                replies.push(Reply::say(format!(
                    ":x: *OpenStack VM creation failed*: {}",
                    e
                )));
                return Ok(replies);
            }
        };
        info!(user, server_id = %server.id, "created OpenStack VM");

        replies.push(Reply::say(format!(
            ":white_check_mark: *Successfully created OpenStack VM `{}`!*",
            server.name
        )));
        replies.extend(instance_table(
            " Server details:",
            std::slice::from_ref(&server),
            OPENSTACK_CREATE_COLUMNS,
        ));
        replies.push(Reply::say(ssh_instructions(
            &selection,
            &config.ssh_user,
            server.private_ip.as_deref().unwrap_or("<private_ip>"),
        )));
        Ok(replies)
    }

    async fn cmd_openstack_vm_list(&self, params: &Params) -> Result<Vec<Reply>> {
        let status = params
            .list_values("status")
            .into_iter()
            .next()
            .unwrap_or_else(|| "ACTIVE".to_string())
            .to_uppercase();

        if !OPENSTACK_STATUSES.contains(&status.as_str()) {
            return Ok(vec![Reply::say(format!(
                ":warning: Invalid status `{}`. Valid statuses: {}",
                status,
                OPENSTACK_STATUSES.join(", ")
            ))]);
        }

        let filter = InstanceFilter {
            states: vec![status.clone()],
            ..Default::default()
        };
        let servers = self
            .state
            .openstack
            .list_instances(&filter)
            .await
            .context("failed to list OpenStack servers")?;

        if servers.is_empty() {
            return Ok(vec![Reply::say(format!(
                ":no_entry_sign: There are currently no VMs in the *{}* state in OpenStack.",
                status
            ))]);
        }

        Ok(instance_table(
            &format!(" OpenStack VMs in the {} state:", status),
            &servers,
            OPENSTACK_LIST_COLUMNS,
        ))
    }

    async fn cmd_openstack_vm_modify(&self, params: &Params) -> Result<Vec<Reply>> {
        let Some(vm_id) = params.non_empty("vm-id") else {
            return Ok(vec![Reply::say(
                ":warning: Please provide the server id with `--vm-id`.",
            )]);
        };

        let allowed = [ModifyAction::Stop, ModifyAction::Start, ModifyAction::Delete];
        let action = match ModifyAction::requested(params, &allowed).as_slice() {
            [action] => *action,
            [] => {
                return Ok(vec![Reply::say(
                    ":warning: Please specify an action: `--stop`, `--start` or `--delete`.",
                )])
            }
            _ => {
                return Ok(vec![Reply::say(
                    ":warning: Please use only one of `--stop`, `--start` or `--delete`.",
                )])
            }
        };

        match ops::modify_instance(self.state.openstack.as_ref(), vm_id, action).await {
            Ok(change) => Ok(vec![Reply::say(match action {
                ModifyAction::Delete => format!(
                    ":wastebasket: VM `{}` ({}) has been deleted.",
                    change.name, change.id
                ),
                _ => format!(
                    ":white_check_mark: VM `{}` status: *{}* -> *{}*",
                    change.name, change.previous_state, change.current_state
                ),
            })]),
            Err(e) => {
                warn!(vm_id, action = action.flag(), "OpenStack modify failed: {:#}", e);
                Ok(vec![Reply::say(format!(
                    ":x: Failed to {} VM `{}`: {}",
                    action.flag(),
                    vm_id,
                    e.root_cause()
                ))])
            }
        }
    }

    /// Run keypair selection and push the user-facing messages for it.
    /// Returns `None` when creation can't proceed.
    async fn keypair_replies(
        &self,
        provider: &dyn ComputeProvider,
        user: &str,
        option: KeyOption,
        replies: &mut Vec<Reply>,
        key_message: impl FnOnce(&str) -> String,
    ) -> Result<Option<KeySelection>> {
        let Some(selection) = ops::select_keypair(provider, user, option).await? else {
            replies.push(Reply::say(format!(
                ":warning: You do not have any existing keys in {}. Use `--key_pair=new` to create one.",
                provider.label()
            )));
            return Ok(None);
        };

        if let Some(material) = selection.key.material.as_deref() {
            replies.push(Reply::direct(user, key_message(material)));
            replies.push(Reply::say("Please check DM for the newly generated private key."));
        }
        Ok(Some(selection))
    }

    // --- Project ---

    fn cmd_project_links(&self) -> Vec<Reply> {
        let links = &self.state.config.team_links;
        if links.is_empty() {
            return vec![Reply::say("There are no links available.")];
        }

        let body = links
            .iter()
            .map(|link| format!(":small_orange_diamond: *{}:* <{}|Link>", link.title, link.url))
            .collect::<Vec<_>>()
            .join("\n");
        vec![Reply::header(" Useful team links:"), Reply::say(body)]
    }

    // --- Rota ---

    async fn cmd_rota(&self, user: &str, params: &Params) -> Result<Vec<Reply>> {
        let actions: Vec<&str> = ["add", "check", "replace"]
            .into_iter()
            .filter(|a| params.flag(a))
            .collect();

        let reply = match actions.as_slice() {
            ["add"] => self.rota_add(user, params).await?,
            ["check"] => self.rota_check(params).await?,
            ["replace"] => self.rota_replace(user, params).await?,
            [] => "You need one of `add`, `check` or `replace`.".to_string(),
            _ => "You can use only 1 of `add`, `check` and `replace`".to_string(),
        };
        Ok(vec![Reply::say(reply)])
    }

    async fn rota_add(&self, user: &str, params: &Params) -> Result<String> {
        let rota = &self.state.config.rota;
        if !rota.is_admin(user) {
            info!(user, "non-admin tried rota add");
            return Ok("Sorry. Only admins can add releases.".to_string());
        }

        let Some(release) = params.non_empty("release") else {
            return Ok("Please provide a release.".to_string());
        };

        let start = params.non_empty("start");
        let end = params.non_empty("end");
        let problems = schedule_problems(start, end);
        if !problems.is_empty() {
            return Ok(problems.join("\n"));
        }

        let person = |key: &str| {
            params
                .non_empty(key)
                .map(|v| name_from_mention(v, &rota.users))
        };
        let new = NewRelease {
            release: release.to_string(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
            pm: person("pm"),
            qe1: person("qe1"),
            qe2: person("qe2"),
        };

        match self.state.rota.add_release(new).await {
            Ok(()) => Ok("Success!".to_string()),
            Err(e) => user_facing(e),
        }
    }

    async fn rota_check(&self, params: &Params) -> Result<String> {
        let release = params.non_empty("release");
        let time = params.non_empty("time");

        let rows = match (release, time) {
            (Some(_), Some(_)) => {
                return Ok("Only provide one of `release` and `time`.".to_string())
            }
            (Some(release), None) => match self.state.rota.fetch_by_release(release).await {
                Ok(row) => row.into_iter().collect::<Vec<_>>(),
                Err(RotaError::InvalidRelease(_)) => {
                    return Ok("Please provide a correctly formatted release version.".to_string())
                }
                Err(e) => return user_facing(e),
            },
            (None, Some(time)) => match self.state.rota.fetch_by_time(time).await {
                Ok(rows) => rows,
                Err(RotaError::InvalidTimePeriod(_)) => {
                    return Ok(
                        "Time period should either be `This Week` or `Next Week`.".to_string()
                    )
                }
                Err(e) => return user_facing(e),
            },
            (None, None) => return Ok("Please provide either `release` or `time`.".to_string()),
        };

        let users = &self.state.config.rota.users;
        let text = rows
            .iter()
            .map(|row| format_rota_row(row, users))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if text.trim().is_empty() {
            Ok("Sorry, could not find the requested data.".to_string())
        } else {
            Ok(text.trim().to_string())
        }
    }

    async fn rota_replace(&self, user: &str, params: &Params) -> Result<String> {
        let rota = &self.state.config.rota;
        if !rota.is_user(user) {
            info!(user, "unauthorized rota replace");
            return Ok("You are not authorized to use `replace`.".to_string());
        }

        let (Some(release), Some(column)) =
            (params.non_empty("release"), params.non_empty("column"))
        else {
            return Ok("Please provide `release` and `column`.".to_string());
        };

        let new_user = params
            .non_empty("user")
            .map(|v| name_from_mention(v, &rota.users));

        match self
            .state
            .rota
            .replace_user(release, column, new_user.as_deref())
            .await
        {
            Ok(()) => Ok("Success!".to_string()),
            Err(e) => user_facing(e),
        }
    }
}

fn not_understood(user: &str) -> String {
    format!(
        "Hello <@{}>! I couldn't understand your request. Please try again or type 'help' for assistance.",
        user
    )
}

/// Comma-separated flags for the keys that are absent or blank
fn missing_params(params: &Params, keys: &[(&str, &str)]) -> String {
    keys.iter()
        .filter(|(key, _)| params.non_empty(key).is_none())
        .map(|(_, flag)| format!("`{}`", flag))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ssh_instructions(selection: &KeySelection, ssh_user: &str, host: &str) -> String {
    format!(
        ":key: *Key pair:* `{}` (fingerprint `{}`)\n\
         To connect, save the private key and run:\n\
         ```chmod 400 {}.pem\nssh -i {}.pem {}@{}```",
        selection.key.name,
        selection.key.fingerprint,
        selection.key.name,
        selection.key.name,
        ssh_user,
        host
    )
}

/// Validation errors go back to the user; storage errors propagate
fn user_facing(e: RotaError) -> Result<String> {
    match e {
        RotaError::Sheet(_) => Err(e.into()),
        other => Ok(other.to_string()),
    }
}

/// Sheet name for a `<@U123>` mention, or the value itself
pub fn name_from_mention(value: &str, users: &BTreeMap<String, String>) -> String {
    let Some(id) = value
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.split('|').next().unwrap_or(inner))
    else {
        return value.to_string();
    };

    users
        .iter()
        .find(|(_, uid)| uid.as_str() == id)
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| id.to_string())
}

/// `<@U123>` for a known sheet name, otherwise the name as a mention
pub fn mention_for_name(name: &str, users: &BTreeMap<String, String>) -> String {
    format!("<@{}>", users.get(name).map(String::as_str).unwrap_or(name))
}

fn format_rota_row(row: &RotaRow, users: &BTreeMap<String, String>) -> String {
    if row.release == "N/A" {
        return String::new();
    }
    let person = |name: &str| {
        if name.is_empty() {
            "-".to_string()
        } else {
            mention_for_name(name, users)
        }
    };
    format!(
        "*Release:* {}\n*Patch Manager:* {}\n*QE:* {}, {}",
        row.release,
        person(&row.pm),
        person(&row.qe1),
        person(&row.qe2)
    )
}
