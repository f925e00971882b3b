// Slash commands: the `/add` definition, interaction handling and the loop
// that consumes gateway events.

use std::sync::Arc;

use rankboard_core::format::rank_summary;
use rankboard_core::orchestrator::{AddOutcome, Orchestrator, RefreshRequest, RefreshTrigger};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::discord::gateway::{CommandData, GatewayEvent, Interaction};
use crate::discord::rest::InteractionApi;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ADD_COMMAND: &str = "add";

/// Interaction type for slash commands.
const APPLICATION_COMMAND: u8 = 2;
/// Option type for strings.
const STRING_OPTION: u8 = 3;

pub const NOT_FOUND_REPLY: &str = "Player not found";
pub const MISSING_ARGS_REPLY: &str = "Both a username and a tag are required.";
pub const ERROR_REPLY: &str = "There was an error while executing this command!";
pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command.";

// ---------------------------------------------------------------------------
// Definitions and parsing
// ---------------------------------------------------------------------------

/// Every slash command the bot registers.
pub fn command_definitions() -> Value {
    json!([
        {
            "name": ADD_COMMAND,
            "description": "Add a player to the leaderboard",
            "type": 1,
            "options": [
                {
                    "type": STRING_OPTION,
                    "name": "username",
                    "description": "The username of the player",
                    "required": true,
                },
                {
                    "type": STRING_OPTION,
                    "name": "tag",
                    "description": "The tag of the player",
                    "required": true,
                },
            ],
        }
    ])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub username: String,
    pub tag: String,
}

/// Extract `/add` arguments. A leading `#` on the tag is dropped.
pub fn parse_add(data: &CommandData) -> Option<AddRequest> {
    let username = data.string_option("username")?.trim();
    let tag = data.string_option("tag")?.trim().trim_start_matches('#').trim();
    if username.is_empty() || tag.is_empty() {
        return None;
    }
    Some(AddRequest {
        username: username.to_string(),
        tag: tag.to_string(),
    })
}

pub fn add_reply(outcome: &AddOutcome) -> String {
    match outcome {
        AddOutcome::Added { record, .. } => format!(
            "Added {}#{} with rank {}",
            record.display_name,
            record.tag,
            rank_summary(&record.rank)
        ),
        AddOutcome::NotFound => NOT_FOUND_REPLY.to_string(),
    }
}

// ---------------------------------------------------------------------------
// CommandHandler
// ---------------------------------------------------------------------------

pub struct CommandHandler {
    orchestrator: Arc<Orchestrator>,
    api: Arc<dyn InteractionApi>,
    refresh: RefreshTrigger,
    /// Configured application id; READY supplies it otherwise.
    application_id: Option<String>,
    register_commands: bool,
}

impl CommandHandler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        api: Arc<dyn InteractionApi>,
        refresh: RefreshTrigger,
        application_id: Option<String>,
        register_commands: bool,
    ) -> Self {
        Self {
            orchestrator,
            api,
            refresh,
            application_id,
            register_commands,
        }
    }

    /// Handle one interaction end to end. Errors are logged and, once the
    /// interaction is acknowledged, reported back to the user.
    pub async fn handle(&self, interaction: Interaction) {
        if interaction.kind != APPLICATION_COMMAND {
            debug!("Ignoring interaction of type {}", interaction.kind);
            return;
        }
        let data = match interaction.data.as_ref() {
            Some(data) if data.name == ADD_COMMAND => data,
            other => {
                warn!(
                    "Unknown command /{} in interaction {}",
                    other.map_or("", |d| d.name.as_str()),
                    interaction.id
                );
                self.reply_privately(&interaction, UNKNOWN_COMMAND_REPLY).await;
                return;
            }
        };

        if let Err(e) = self.api.defer_ephemeral(&interaction).await {
            error!("Failed to acknowledge /{}: {e}", data.name);
            return;
        }

        let (reply, added) = match parse_add(data) {
            None => (MISSING_ARGS_REPLY.to_string(), false),
            Some(request) => {
                info!("/add {}#{}", request.username, request.tag);
                match self.orchestrator.add_player(&request.username, &request.tag).await {
                    Ok(outcome) => {
                        let added = matches!(outcome, AddOutcome::Added { .. });
                        (add_reply(&outcome), added)
                    }
                    Err(e) => {
                        error!("/add {}#{} failed: {e}", request.username, request.tag);
                        (ERROR_REPLY.to_string(), false)
                    }
                }
            }
        };

        if let Err(e) = self.api.edit_reply(&interaction, &reply).await {
            error!("Failed to send /add reply: {e}");
        }

        if added {
            match self.refresh.request() {
                RefreshRequest::Queued => debug!("Refresh queued after /add"),
                RefreshRequest::Merged => debug!("Refresh already queued"),
                RefreshRequest::Stopped => warn!("Refresh worker stopped; leaderboard not updated"),
            }
        }
    }

    /// Acknowledge and answer in one go, for interactions that need no work.
    async fn reply_privately(&self, interaction: &Interaction, content: &str) {
        if let Err(e) = self.api.defer_ephemeral(interaction).await {
            error!("Failed to acknowledge interaction {}: {e}", interaction.id);
            return;
        }
        if let Err(e) = self.api.edit_reply(interaction, content).await {
            error!("Failed to reply to interaction {}: {e}", interaction.id);
        }
    }

    async fn on_ready(&self, ready_application_id: String) -> bool {
        let application_id = self.application_id.clone().unwrap_or(ready_application_id);
        match self
            .api
            .register_commands(&application_id, &command_definitions())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to register slash commands: {e}");
                false
            }
        }
    }
}

/// Consume gateway events until the channel closes. Each interaction runs on
/// its own task; outstanding handlers finish before this returns.
pub async fn run(handler: Arc<CommandHandler>, mut events: mpsc::Receiver<GatewayEvent>) {
    let mut registered = !handler.register_commands;
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Command handler panicked: {e}");
                }
            }

            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    GatewayEvent::Ready { application_id, .. } => {
                        if !registered {
                            registered = handler.on_ready(application_id).await;
                        }
                    }
                    GatewayEvent::Interaction(interaction) => {
                        let handler = Arc::clone(&handler);
                        tasks.spawn(async move { handler.handle(interaction).await });
                    }
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Command handler panicked: {e}");
        }
    }
    info!("Command loop stopped");
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::gateway::CommandOption;
    use async_trait::async_trait;
    use rankboard_core::error::{LookupError, PublishError};
    use rankboard_core::format::MarkerTable;
    use rankboard_core::orchestrator::RefreshSettings;
    use rankboard_core::rank::{Division, RankInfo, Tier};
    use rankboard_core::reconcile::{MessageId, PageSink, RenderedPage};
    use rankboard_core::roster::IdentityKey;
    use rankboard_core::source::RankSource;
    use rankboard_core::store::MemoryStore;
    use std::sync::Mutex;

    struct OneAccount;

    #[async_trait]
    impl RankSource for OneAccount {
        async fn resolve_identity(&self, name: &str, tag: &str) -> Result<Option<IdentityKey>, LookupError> {
            match (name, tag) {
                ("Alpha", "EUW") => Ok(Some(IdentityKey::new("p-alpha"))),
                ("Broken", _) => Err(LookupError::Transport("connection reset".into())),
                _ => Ok(None),
            }
        }

        async fn fetch_rank(&self, _key: &IdentityKey, _tag: &str) -> Result<RankInfo, LookupError> {
            Ok(RankInfo::new(Tier::Gold, Some(Division::II), 40))
        }
    }

    struct NullSink;

    #[async_trait]
    impl PageSink for NullSink {
        async fn update_page(&self, _id: &MessageId, _page: &RenderedPage) -> Result<(), PublishError> {
            Ok(())
        }

        async fn create_page(&self, _page: &RenderedPage) -> Result<MessageId, PublishError> {
            Ok(MessageId::new("m"))
        }

        async fn delete_page(&self, _id: &MessageId) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InteractionApi for RecordingApi {
        async fn defer_ephemeral(&self, interaction: &Interaction) -> Result<(), PublishError> {
            self.calls.lock().unwrap().push(format!("defer {}", interaction.id));
            Ok(())
        }

        async fn edit_reply(&self, _interaction: &Interaction, content: &str) -> Result<(), PublishError> {
            self.calls.lock().unwrap().push(format!("reply {content}"));
            Ok(())
        }

        async fn register_commands(&self, application_id: &str, _commands: &Value) -> Result<(), PublishError> {
            self.calls.lock().unwrap().push(format!("register {application_id}"));
            Ok(())
        }
    }

    fn add_interaction(username: &str, tag: &str) -> Interaction {
        Interaction {
            id: "int-1".into(),
            application_id: "app-1".into(),
            token: "tok".into(),
            kind: APPLICATION_COMMAND,
            data: Some(CommandData {
                name: ADD_COMMAND.into(),
                options: vec![
                    CommandOption {
                        name: "username".into(),
                        value: Some(json!(username)),
                    },
                    CommandOption {
                        name: "tag".into(),
                        value: Some(json!(tag)),
                    },
                ],
            }),
        }
    }

    struct Harness {
        handler: Arc<CommandHandler>,
        api: Arc<RecordingApi>,
        store: Arc<MemoryStore>,
        refresh: rankboard_core::orchestrator::RefreshHandle,
    }

    fn harness(application_id: Option<&str>, register: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(
            Orchestrator::new(
                Arc::new(OneAccount),
                Arc::new(NullSink),
                store.clone(),
                MarkerTable::default(),
                RefreshSettings::default(),
            )
            .unwrap(),
        );
        let refresh = orchestrator.start();
        let api = Arc::new(RecordingApi::default());
        let handler = Arc::new(CommandHandler::new(
            orchestrator,
            api.clone(),
            refresh.trigger(),
            application_id.map(str::to_string),
            register,
        ));
        Harness {
            handler,
            api,
            store,
            refresh,
        }
    }

    #[test]
    fn definitions_describe_add_command() {
        let defs = command_definitions();
        assert_eq!(defs[0]["name"], "add");
        assert_eq!(defs[0]["options"][0]["name"], "username");
        assert_eq!(defs[0]["options"][1]["name"], "tag");
        assert_eq!(defs[0]["options"][1]["required"], true);
    }

    #[test]
    fn parse_add_trims_and_strips_hash() {
        let data = add_interaction("  Alpha ", "#EUW").data.unwrap();
        assert_eq!(
            parse_add(&data),
            Some(AddRequest {
                username: "Alpha".into(),
                tag: "EUW".into()
            })
        );
        let empty = add_interaction("Alpha", " # ").data.unwrap();
        assert_eq!(parse_add(&empty), None);
    }

    #[test]
    fn reply_texts() {
        assert_eq!(add_reply(&AddOutcome::NotFound), "Player not found");
        let outcome = AddOutcome::Added {
            key: IdentityKey::new("k"),
            record: rankboard_core::roster::PlayerRecord::new(
                "Alpha",
                "EUW",
                RankInfo::new(Tier::Challenger, Some(Division::I), 1200),
            ),
        };
        assert_eq!(add_reply(&outcome), "Added Alpha#EUW with rank CHALLENGER - 1200 LP");
    }

    #[tokio::test]
    async fn add_defers_then_replies_and_stores_player() {
        let h = harness(None, false);
        h.handler.handle(add_interaction("Alpha", "EUW")).await;

        assert_eq!(
            h.api.calls(),
            vec!["defer int-1", "reply Added Alpha#EUW with rank GOLD II - 40 LP"]
        );
        assert_eq!(h.store.roster().len(), 1);
        h.refresh.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_player_gets_not_found_reply() {
        let h = harness(None, false);
        h.handler.handle(add_interaction("Ghost", "EUW")).await;
        assert_eq!(h.api.calls(), vec!["defer int-1", "reply Player not found"]);
        assert!(h.store.roster().is_empty());
        h.refresh.shutdown().await;
    }

    #[tokio::test]
    async fn lookup_failure_gets_error_reply() {
        let h = harness(None, false);
        h.handler.handle(add_interaction("Broken", "EUW")).await;
        assert_eq!(
            h.api.calls(),
            vec![
                "defer int-1".to_string(),
                format!("reply {ERROR_REPLY}")
            ]
        );
        h.refresh.shutdown().await;
    }

    #[tokio::test]
    async fn non_command_interactions_are_ignored() {
        let h = harness(None, false);
        let mut ping = add_interaction("Alpha", "EUW");
        ping.kind = 1;
        h.handler.handle(ping).await;

        assert!(h.api.calls().is_empty());
        h.refresh.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_command_gets_private_reply() {
        let h = harness(None, false);
        let mut other = add_interaction("Alpha", "EUW");
        if let Some(data) = other.data.as_mut() {
            data.name = "remove".into();
        }
        h.handler.handle(other).await;

        let mut bare = add_interaction("Alpha", "EUW");
        bare.data = None;
        h.handler.handle(bare).await;

        let reply = format!("reply {UNKNOWN_COMMAND_REPLY}");
        assert_eq!(
            h.api.calls(),
            vec!["defer int-1".to_string(), reply.clone(), "defer int-1".to_string(), reply]
        );
        assert!(h.store.roster().is_empty());
        h.refresh.shutdown().await;
    }

    #[tokio::test]
    async fn run_registers_once_and_dispatches_interactions() {
        let h = harness(Some("configured-app"), true);
        let (tx, rx) = mpsc::channel(8);
        let loop_task = tokio::spawn(run(Arc::clone(&h.handler), rx));

        tx.send(GatewayEvent::Ready {
            application_id: "ready-app".into(),
            user: "bot".into(),
        })
        .await
        .unwrap();
        tx.send(GatewayEvent::Ready {
            application_id: "ready-app".into(),
            user: "bot".into(),
        })
        .await
        .unwrap();
        tx.send(GatewayEvent::Interaction(add_interaction("Ghost", "EUW")))
            .await
            .unwrap();
        drop(tx);
        loop_task.await.unwrap();

        let calls = h.api.calls();
        assert_eq!(calls[0], "register configured-app");
        assert_eq!(calls.iter().filter(|c| c.starts_with("register")).count(), 1);
        assert!(calls.contains(&"reply Player not found".to_string()));
        h.refresh.shutdown().await;
    }
}
