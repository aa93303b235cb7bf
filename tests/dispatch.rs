//! End-to-end dispatch tests
//!
//! Drives `Bot::handle_message` against in-process clouds and rota sheet,
//! covering the message shapes users send in chat.

use std::sync::Arc;

use async_trait::async_trait;
use opsbot::cloud::{
    CloudError, ComputeProvider, CreateRequest, Instance, InstanceFilter, KeyPair,
    LifecycleChange, MemoryCloud,
};
use opsbot::commands::Bot;
use opsbot::config::BotConfig;
use opsbot::display::Reply;
use opsbot::registry::CommandRegistry;
use opsbot::rota::{MemorySheet, RotaColumn, RotaError, RotaRow, RotaService, RotaSheet};
use opsbot::state::SharedState;

const ADMIN: &str = "U100";
const MEMBER: &str = "U200";
const STRANGER: &str = "U999";

// ============================================================================
// Fixtures
// ============================================================================

fn test_config() -> BotConfig {
    BotConfig::from_toml(
        r#"
[openstack]
default_network = "shared"
flavors = ["ci.cpu.small"]

[openstack.images]
fedora = "img-fedora"
ubuntu = "img-ubuntu"

[openstack.networks]
shared = "net-1"

[[team_links]]
title = "Runbook"
url = "https://example.com/runbook"

[rota.admins]
"john.doe" = "U100"

[rota.users]
"john.doe" = "U100"
"jane.smith" = "U200"
"#,
    )
    .expect("test config parses")
}

struct Harness {
    bot: Bot,
    aws: Arc<MemoryCloud>,
    openstack: Arc<MemoryCloud>,
}

fn harness_with(config: BotConfig, rows: Vec<RotaRow>) -> Harness {
    let aws = Arc::new(MemoryCloud::aws());
    let openstack = Arc::new(MemoryCloud::openstack());
    let state = SharedState {
        config,
        registry: CommandRegistry::with_defaults(),
        aws: aws.clone(),
        openstack: openstack.clone(),
        rota: RotaService::new(Arc::new(MemorySheet::with_rows(rows))),
    };
    Harness {
        bot: Bot::new(Arc::new(state)),
        aws,
        openstack,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), Vec::new())
}

fn rota_row(release: &str, activity: &str) -> RotaRow {
    RotaRow {
        release: release.to_string(),
        start: "2024-01-01".to_string(),
        end: "2024-01-05".to_string(),
        pm: "john.doe".to_string(),
        qe1: "jane.smith".to_string(),
        qe2: "bob.wilson".to_string(),
        activity: activity.to_string(),
    }
}

fn instance(id: &str, name: &str, instance_type: &str, state: &str) -> Instance {
    Instance {
        id: id.to_string(),
        name: name.to_string(),
        instance_type: instance_type.to_string(),
        state: state.to_string(),
        private_ip: Some("10.0.0.5".to_string()),
        ..Default::default()
    }
}

/// Sheet whose storage is unreachable
struct OfflineSheet;

#[async_trait]
impl RotaSheet for OfflineSheet {
    async fn rows(&self) -> Result<Vec<RotaRow>, RotaError> {
        Err(RotaError::Sheet("offline".to_string()))
    }

    async fn append_row(&self, _row: RotaRow) -> Result<(), RotaError> {
        Err(RotaError::Sheet("offline".to_string()))
    }

    async fn set_cell(
        &self,
        _index: usize,
        _column: RotaColumn,
        _value: Option<String>,
    ) -> Result<(), RotaError> {
        Err(RotaError::Sheet("offline".to_string()))
    }
}

/// Cloud whose API rejects every call
struct FailingCloud;

fn backend_down() -> CloudError {
    CloudError::Backend("service unavailable".to_string())
}

#[async_trait]
impl ComputeProvider for FailingCloud {
    fn label(&self) -> &str {
        "AWS"
    }

    async fn list_instances(&self, _filter: &InstanceFilter) -> Result<Vec<Instance>, CloudError> {
        Err(backend_down())
    }

    async fn create_instance(&self, _request: &CreateRequest) -> Result<Instance, CloudError> {
        Err(backend_down())
    }

    async fn stop_instance(&self, _id: &str) -> Result<LifecycleChange, CloudError> {
        Err(backend_down())
    }

    async fn start_instance(&self, _id: &str) -> Result<LifecycleChange, CloudError> {
        Err(backend_down())
    }

    async fn delete_instance(&self, _id: &str) -> Result<LifecycleChange, CloudError> {
        Err(backend_down())
    }

    async fn describe_keypair(&self, _name: &str) -> Result<Option<KeyPair>, CloudError> {
        Err(backend_down())
    }

    async fn create_keypair(&self, _name: &str) -> Result<KeyPair, CloudError> {
        Err(backend_down())
    }

    async fn delete_keypair(&self, _name: &str) -> Result<bool, CloudError> {
        Err(backend_down())
    }
}

fn failing_bot() -> Bot {
    let state = SharedState {
        config: test_config(),
        registry: CommandRegistry::with_defaults(),
        aws: Arc::new(FailingCloud),
        openstack: Arc::new(MemoryCloud::openstack()),
        rota: RotaService::new(Arc::new(OfflineSheet)),
    };
    Bot::new(Arc::new(state))
}

const INTERNAL_ERROR: &str = ":x: An internal error occurred, please contact administrator.";

/// All reply text joined, for substring assertions
fn text(replies: &[Reply]) -> String {
    replies
        .iter()
        .map(Reply::text)
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Greeting, help, fallbacks
// ============================================================================

#[tokio::test]
async fn test_hello_with_mention() {
    let h = harness();
    let replies = h.bot.handle_message("U1", "<@UBOT> hello").await;
    assert_eq!(
        replies,
        vec![Reply::say("Hello <@U1>! How can I assist you today?")]
    );
}

#[tokio::test]
async fn test_unknown_and_empty_messages() {
    let h = harness();
    let expected = vec![Reply::say(
        "Hello <@U1>! I couldn't understand your request. Please try again or type 'help' for assistance.",
    )];

    assert_eq!(h.bot.handle_message("U1", "@bot unknown param").await, expected);
    assert_eq!(h.bot.handle_message("U1", "<@UBOT>").await, expected);
    assert_eq!(
        h.bot.handle_message("U1", "aws vm creaate --os_name=linux").await,
        expected
    );
}

#[tokio::test]
async fn test_named_mention_must_match_bot_name() {
    let h = harness();
    assert_eq!(
        text(&h.bot.handle_message("U1", "@OpsBot hello").await),
        "Hello <@U1>! How can I assist you today?"
    );
    assert!(text(&h.bot.handle_message("U1", "@alice hello").await)
        .contains("I couldn't understand your request"));

    let mut config = test_config();
    config.bot_name = "sustain".to_string();
    let renamed = harness_with(config, Vec::new());
    assert_eq!(
        text(&renamed.bot.handle_message("U1", "@sustain hello").await),
        "Hello <@U1>! How can I assist you today?"
    );
    assert!(text(&renamed.bot.handle_message("U1", "@opsbot hello").await)
        .contains("I couldn't understand your request"));
}

#[tokio::test]
async fn test_help_overview_lists_commands() {
    let h = harness();
    let out = text(&h.bot.handle_message("U1", "help").await);
    assert!(out.contains("*Available Commands:*"));
    assert!(out.contains("aws vm create"));
    assert!(out.contains("openstack vm list"));
    assert!(out.contains("rota"));
}

#[tokio::test]
async fn test_help_forms_agree() {
    let h = harness();
    let by_command = h.bot.handle_message("U1", "help aws vm create").await;
    let by_token = h.bot.handle_message("U1", "aws vm create help").await;
    let by_flag = h.bot.handle_message("U1", "aws vm create --help").await;
    let by_short = h.bot.handle_message("U1", "aws vm create -h").await;

    assert!(text(&by_command).contains("`aws vm create`"));
    assert_eq!(by_command, by_token);
    assert_eq!(by_token, by_flag);
    assert_eq!(by_flag, by_short);
}

#[tokio::test]
async fn test_help_unknown_suggests() {
    let h = harness();
    let out = text(&h.bot.handle_message("U1", "help vm").await);
    assert!(out.contains("Command `vm` not found. Did you mean:"));
    assert!(out.contains("aws vm list"));
}

#[tokio::test]
async fn test_project_links() {
    let h = harness();
    let replies = h.bot.handle_message("U1", "project links list").await;
    assert!(matches!(replies[0], Reply::Header { .. }));
    assert!(text(&replies).contains("*Runbook:* <https://example.com/runbook|Link>"));

    let empty = harness_with(BotConfig::default(), Vec::new());
    assert_eq!(
        empty.bot.handle_message("U1", "project links list").await,
        vec![Reply::say("There are no links available.")]
    );
}

// ============================================================================
// AWS
// ============================================================================

#[tokio::test]
async fn test_aws_list_empty() {
    let h = harness();
    assert_eq!(
        text(&h.bot.handle_message("U1", "aws vm list").await),
        "There are currently no EC2 instances to retrieve"
    );
    assert_eq!(
        text(&h.bot.handle_message("U1", "aws vm list --state=running").await),
        "There are currently no EC2 instances available that match the specified criteria"
    );
}

#[tokio::test]
async fn test_aws_list_filters() {
    let h = harness();
    h.aws.insert(instance("i-1", "web", "t2.micro", "running")).await;
    h.aws.insert(instance("i-2", "db", "t3.small", "stopped")).await;
    h.aws.insert(instance("i-3", "old", "t2.micro", "terminated")).await;

    let replies = h
        .bot
        .handle_message("U1", "aws vm list --state=running, stopped --type t2.micro")
        .await;
    assert_eq!(replies.len(), 2);
    assert!(matches!(replies[0], Reply::Header { .. }));
    let table = replies[1].text();
    assert!(table.contains("instance_id"));
    assert!(table.contains("i-1"));
    assert!(!table.contains("i-2"));
    assert!(!table.contains("i-3"));
}

#[tokio::test]
async fn test_aws_create_validation() {
    let h = harness();

    let out = text(&h.bot.handle_message("U1", "aws vm create --os_name=linux").await);
    assert!(out.contains("Missing required parameters"));
    assert!(out.contains("`--instance_type`, `--key_pair`"));

    let out = text(
        &h.bot
            .handle_message(
                "U1",
                "aws vm create --os_name=linux --instance_type=t2.micro --key_pair=old",
            )
            .await,
    );
    assert!(out.contains("`key_pair` should be either `new` or `existing`"));

    let out = text(
        &h.bot
            .handle_message(
                "U1",
                "aws vm create --os_name=windows --instance_type=t2.micro --key_pair=new",
            )
            .await,
    );
    assert!(out.contains("Unsupported OS name: `windows`"));
}

#[tokio::test]
async fn test_aws_create_new_key_sends_dm() {
    let h = harness();
    let replies = h
        .bot
        .handle_message(
            "U1",
            "aws vm create --os_name=Linux --instance_type=t2.micro --key_pair=new",
        )
        .await;

    let dm = replies
        .iter()
        .find_map(|r| match r {
            Reply::Direct { user, text } => Some((user.clone(), text.clone())),
            _ => None,
        })
        .expect("private key is sent by DM");
    assert_eq!(dm.0, "U1");
    assert!(dm.1.contains("BEGIN OPENSSH PRIVATE KEY"));

    let out = text(&replies);
    assert!(out.contains("of type `t2.micro` in `us-east-1`"));
    assert!(out.contains("Please check DM for the newly generated private key."));
    assert!(out.contains("Successfully created EC2 instance"));
    assert!(out.contains("ssh -i U1.pem ec2-user@"));

    let running = h
        .aws
        .list_instances(&InstanceFilter {
            states: vec!["running".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].key_name.as_deref(), Some("U1"));
}

#[tokio::test]
async fn test_aws_create_existing_key() {
    let h = harness();
    let out = text(
        &h.bot
            .handle_message(
                "U1",
                "aws vm create --os_name=linux --instance_type=t2.micro --key_pair=existing",
            )
            .await,
    );
    assert!(out.contains("You do not have any existing keys in AWS"));
    assert!(h.aws.list_instances(&InstanceFilter::default()).await.unwrap().is_empty());

    h.aws.create_keypair("U1").await.unwrap();
    let replies = h
        .bot
        .handle_message(
            "U1",
            "aws vm create --os_name=linux --instance_type=t2.micro --key_pair=existing",
        )
        .await;
    assert!(!replies.iter().any(|r| matches!(r, Reply::Direct { .. })));
    assert!(text(&replies).contains("Successfully created EC2 instance"));
}

#[tokio::test]
async fn test_aws_modify() {
    let h = harness();
    h.aws.insert(instance("i-1", "web", "t2.micro", "running")).await;

    let out = text(&h.bot.handle_message("U1", "aws vm modify --stop").await);
    assert!(out.contains("`--vm-id`"));

    let out = text(&h.bot.handle_message("U1", "aws vm modify --vm-id=i-1").await);
    assert!(out.contains("Please specify an action"));

    let out = text(
        &h.bot
            .handle_message("U1", "aws vm modify --stop --delete --vm-id=i-1")
            .await,
    );
    assert!(out.contains("only one of"));

    let out = text(&h.bot.handle_message("U1", "aws vm modify --stop --vm-id=i-1").await);
    assert!(out.contains("*running* -> *stopped*"));

    let out = text(&h.bot.handle_message("U1", "aws vm modify --delete --vm-id=i-1").await);
    assert!(out.contains("cannot be undone"));
    assert!(out.contains("*stopped* -> *terminated*"));

    let out = text(&h.bot.handle_message("U1", "aws vm modify --stop --vm-id=i-404").await);
    assert!(out.contains("Failed to stop instance `i-404`"));
}

// ============================================================================
// OpenStack
// ============================================================================

#[tokio::test]
async fn test_openstack_list_status() {
    let h = harness();
    h.openstack
        .insert(instance("srv-1", "builder", "ci.cpu.small", "ACTIVE"))
        .await;
    h.openstack
        .insert(instance("srv-2", "parked", "ci.cpu.small", "SHUTOFF"))
        .await;

    let table = text(&h.bot.handle_message("U1", "openstack vm list").await);
    assert!(table.contains("srv-1"));
    assert!(!table.contains("srv-2"));

    let table = text(&h.bot.handle_message("U1", "openstack vm list --status=shutoff").await);
    assert!(table.contains("srv-2"));

    assert_eq!(
        text(&h.bot.handle_message("U1", "openstack vm list --status=ERROR").await),
        ":no_entry_sign: There are currently no VMs in the *ERROR* state in OpenStack."
    );

    let out = text(&h.bot.handle_message("U1", "openstack vm list --status=PAUSED").await);
    assert!(out.contains("Invalid status `PAUSED`"));
}

#[tokio::test]
async fn test_openstack_create() {
    let h = harness();

    let out = text(
        &h.bot
            .handle_message("U1", "openstack vm create --name=myvm --os_name=fedora")
            .await,
    );
    assert!(out.contains("`--flavor`, `--key_pair`"));
    assert!(out.contains("fedora, ubuntu"));

    let out = text(
        &h.bot
            .handle_message(
                "U1",
                "openstack vm create --name=myvm --os_name=arch --flavor=ci.cpu.small --key_pair=new",
            )
            .await,
    );
    assert!(out.contains("Unsupported OS name: `arch`"));

    let replies = h
        .bot
        .handle_message(
            "U1",
            "openstack vm create --name=\"my vm\" --os_name=Fedora --flavor=ci.cpu.small --key_pair=new",
        )
        .await;
    let out = text(&replies);
    assert!(out.contains("Successfully created OpenStack VM `my vm`"));
    assert!(out.contains("net-1"));
    assert!(out.contains("fedora@10.0.0."));
    assert!(replies.iter().any(|r| matches!(r, Reply::Direct { .. })));
}

#[tokio::test]
async fn test_openstack_modify_lifecycle() {
    let h = harness();
    h.openstack
        .insert(instance("srv-1", "builder", "ci.cpu.small", "ACTIVE"))
        .await;

    let out = text(
        &h.bot
            .handle_message("U1", "openstack vm modify --stop --vm-id=srv-1")
            .await,
    );
    assert!(out.contains("*ACTIVE* -> *SHUTOFF*"));

    let out = text(
        &h.bot
            .handle_message("U1", "openstack vm modify --stop --vm-id=srv-1")
            .await,
    );
    assert!(out.contains("Failed to stop VM `srv-1`"));

    let out = text(
        &h.bot
            .handle_message("U1", "openstack vm modify --start --vm-id=srv-1")
            .await,
    );
    assert!(out.contains("*SHUTOFF* -> *ACTIVE*"));

    let out = text(
        &h.bot
            .handle_message("U1", "openstack vm modify --delete --vm-id=srv-1")
            .await,
    );
    assert!(out.contains("has been deleted"));
    assert!(h
        .openstack
        .list_instances(&InstanceFilter::default())
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Rota
// ============================================================================

#[tokio::test]
async fn test_rota_action_count() {
    let h = harness();
    assert_eq!(
        text(&h.bot.handle_message(ADMIN, "rota --release=4.15.1").await),
        "You need one of `add`, `check` or `replace`."
    );
    assert_eq!(
        text(&h.bot.handle_message(ADMIN, "rota --add --check").await),
        "You can use only 1 of `add`, `check` and `replace`"
    );
}

#[tokio::test]
async fn test_rota_add() {
    let h = harness();

    assert_eq!(
        text(&h.bot.handle_message(MEMBER, "rota --add --release=4.15.1").await),
        "Sorry. Only admins can add releases."
    );
    assert_eq!(
        text(&h.bot.handle_message(ADMIN, "rota --add").await),
        "Please provide a release."
    );
    assert_eq!(
        text(
            &h.bot
                .handle_message(
                    ADMIN,
                    "rota --add --release=4.15.1 --start=2024-01-02 --end=2024-01-05",
                )
                .await
        ),
        "Start date should be a Monday."
    );
    assert!(text(&h.bot.handle_message(ADMIN, "rota --add --release=4.15").await)
        .contains("does not match the expected release format"));

    assert_eq!(
        text(
            &h.bot
                .handle_message(
                    ADMIN,
                    "rota --add --release=4.15.1 --start=2024-01-01 --end=2024-01-05 --pm=<@U100> --qe1=<@U200>",
                )
                .await
        ),
        "Success!"
    );
    assert_eq!(
        text(&h.bot.handle_message(MEMBER, "rota --check --release=4.15.1").await),
        "*Release:* 4.15.1\n*Patch Manager:* <@U100>\n*QE:* <@U200>, -"
    );
}

#[tokio::test]
async fn test_rota_check() {
    let h = harness_with(
        test_config(),
        vec![
            rota_row("4.15.1", "This Week"),
            rota_row("4.15.2", "Next Week"),
            rota_row("N/A", "This Week"),
        ],
    );

    let out = text(&h.bot.handle_message(STRANGER, "rota --check --time=this week").await);
    assert_eq!(
        out,
        "*Release:* 4.15.1\n*Patch Manager:* <@U100>\n*QE:* <@U200>, <@bob.wilson>"
    );

    assert_eq!(
        text(&h.bot.handle_message(STRANGER, "rota --check").await),
        "Please provide either `release` or `time`."
    );
    assert_eq!(
        text(
            &h.bot
                .handle_message(STRANGER, "rota --check --release=4.15.1 --time=Next Week")
                .await
        ),
        "Only provide one of `release` and `time`."
    );
    assert_eq!(
        text(&h.bot.handle_message(STRANGER, "rota --check --release=4.15").await),
        "Please provide a correctly formatted release version."
    );
    assert_eq!(
        text(&h.bot.handle_message(STRANGER, "rota --check --time=Last Week").await),
        "Time period should either be `This Week` or `Next Week`."
    );
    assert_eq!(
        text(&h.bot.handle_message(STRANGER, "rota --check --release=9.9.9").await),
        "Sorry, could not find the requested data."
    );
}

#[tokio::test]
async fn test_rota_replace() {
    let h = harness_with(test_config(), vec![rota_row("4.15.1", "This Week")]);

    assert_eq!(
        text(
            &h.bot
                .handle_message(
                    STRANGER,
                    "rota --replace --release=4.15.1 --column=pm --user=<@U200>",
                )
                .await
        ),
        "You are not authorized to use `replace`."
    );
    assert_eq!(
        text(&h.bot.handle_message(MEMBER, "rota --replace --release=4.15.1").await),
        "Please provide `release` and `column`."
    );
    assert!(text(
        &h.bot
            .handle_message(MEMBER, "rota --replace --release=4.15.1 --column=qe3")
            .await
    )
    .contains("invalid value for replace column"));

    assert_eq!(
        text(
            &h.bot
                .handle_message(
                    MEMBER,
                    "rota --replace --release=4.15.1 --column=PM --user=<@U200>",
                )
                .await
        ),
        "Success!"
    );
    assert_eq!(
        text(&h.bot.handle_message(MEMBER, "rota --replace --release=4.15.1 --column=qe2").await),
        "Success!"
    );
    assert_eq!(
        text(&h.bot.handle_message(MEMBER, "rota --check --release=4.15.1").await),
        "*Release:* 4.15.1\n*Patch Manager:* <@U200>\n*QE:* <@U200>, -"
    );
}

#[test]
fn test_blocking_dispatch() {
    let h = harness();
    let replies = tokio_test::block_on(h.bot.handle_message("U7", "hello"));
    let payload = replies[0].to_slack_payload("C1");
    assert_eq!(payload["channel"], "C1");
    assert_eq!(payload["text"], "Hello <@U7>! How can I assist you today?");
}

// ============================================================================
// Backend failures
// ============================================================================

#[tokio::test]
async fn test_sheet_failure_becomes_apology() {
    let bot = failing_bot();

    assert_eq!(
        bot.handle_message(MEMBER, "rota --check --release=4.15.1").await,
        vec![Reply::say(INTERNAL_ERROR)]
    );
    assert_eq!(
        bot.handle_message(ADMIN, "rota --add --release=4.15.1").await,
        vec![Reply::say(INTERNAL_ERROR)]
    );

    // validation still answers before storage is touched
    assert_eq!(
        text(&bot.handle_message(MEMBER, "rota --check --release=4.15").await),
        "Please provide a correctly formatted release version."
    );

    assert_eq!(
        bot.handle_message("U1", "hello").await,
        vec![Reply::say("Hello <@U1>! How can I assist you today?")]
    );
}

#[tokio::test]
async fn test_cloud_failure_becomes_apology() {
    let bot = failing_bot();

    assert_eq!(
        bot.handle_message("U1", "aws vm list").await,
        vec![Reply::say(INTERNAL_ERROR)]
    );

    // a keypair lookup failure replaces the partial replies
    let replies = bot
        .handle_message(
            "U1",
            "aws vm create --os_name=linux --instance_type=t2.micro --key_pair=new",
        )
        .await;
    assert_eq!(replies, vec![Reply::say(INTERNAL_ERROR)]);

    let out = text(&bot.handle_message("U1", "aws vm modify --stop --vm-id=i-1").await);
    assert!(out.contains("Failed to stop instance `i-1`"));
    assert!(out.contains("service unavailable"));

    // the OpenStack side is unaffected
    assert_eq!(
        text(&bot.handle_message("U1", "openstack vm list").await),
        ":no_entry_sign: There are currently no VMs in the *ACTIVE* state in OpenStack."
    );
    assert_eq!(
        bot.handle_message("U1", "hello").await,
        vec![Reply::say("Hello <@U1>! How can I assist you today?")]
    );
}
