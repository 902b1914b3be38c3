//! Conversation orchestrator.
//!
//! Drives one dialogue through the cycle
//! `AwaitingUserInput → ModelThinking → (ToolDispatch ↔ ModelThinking)* → AwaitingUserInput`.
//! Tool failures of every kind are folded back into the conversation as
//! visible error content so the model can recover; only model failures are
//! returned to the caller.

use crate::catalog::Aggregator;
use crate::config::OrchestratorConfig;
use crate::conversation::ConversationState;
use crate::error::{DispatchError, ModelError, OrchestratorError};
use crate::llm::{LanguageModel, ModelReply};
use crate::provider::Connector;
use crate::types::{ContentBlock, ToolDescriptor, ToolInvocation, ToolResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingUserInput,
    ModelThinking,
    ToolDispatch,
}

pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    aggregator: Aggregator,
    connector: Option<Arc<dyn Connector>>,
    state: ConversationState,
    phase: Phase,
    config: OrchestratorConfig,
    model_timeout: Duration,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, aggregator: Aggregator) -> Self {
        Self {
            model,
            aggregator,
            connector: None,
            state: ConversationState::new(),
            phase: Phase::AwaitingUserInput,
            config: OrchestratorConfig::default(),
            model_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Used to re-establish closed provider sessions before a dispatch
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn catalog(&self) -> &[ToolDescriptor] {
        self.aggregator.catalog()
    }

    /// Process one user turn to completion and return the model's answer.
    ///
    /// Takes `&mut self`, so a new user turn can never start while a model
    /// or tool call is in flight.
    pub async fn handle_user_input(&mut self, input: &str) -> Result<String, OrchestratorError> {
        self.state.push_user(input);
        let outcome = self.run_turn().await;
        self.phase = Phase::AwaitingUserInput;
        outcome
    }

    async fn run_turn(&mut self) -> Result<String, OrchestratorError> {
        let mut rounds = 0;

        loop {
            self.phase = Phase::ModelThinking;
            match self.ask_model().await? {
                ModelReply::Text(answer) => {
                    self.state.push_model(answer.clone());
                    return Ok(answer);
                }
                ModelReply::ToolCalls(invocations) => {
                    if rounds == self.config.max_tool_rounds {
                        tracing::warn!(rounds, "Tool round limit reached");
                        return Err(OrchestratorError::ToolRoundLimit(rounds));
                    }
                    rounds += 1;
                    self.dispatch_batch(invocations).await;
                }
            }
        }
    }

    async fn ask_model(&self) -> Result<ModelReply, ModelError> {
        let request = self
            .model
            .generate(self.state.turns(), self.aggregator.catalog());

        match tokio::time::timeout(self.model_timeout, request).await {
            Ok(reply) => reply,
            Err(_) => Err(ModelError::Timeout),
        }
    }

    async fn dispatch_batch(&mut self, invocations: Vec<ToolInvocation>) {
        self.phase = Phase::ToolDispatch;

        if self.config.reconnect {
            if let Some(connector) = &self.connector {
                self.aggregator.revive(connector.as_ref()).await;
            }
        }

        self.state.push_tool_request(invocations.clone());

        // Independent calls may overlap; each connection serializes its own
        let aggregator = &self.aggregator;
        let results = join_all(invocations.iter().map(|invocation| async move {
            let outcome = aggregator.dispatch(invocation).await;
            (invocation, fold_outcome(invocation, outcome))
        }))
        .await;

        for (invocation, result) in results {
            self.state.push_tool_result(invocation, result);
        }
    }

    /// Close all provider sessions in order
    pub async fn shutdown(&self) {
        self.aggregator.shutdown().await;
    }
}

fn fold_outcome(
    invocation: &ToolInvocation,
    outcome: Result<ToolResult, DispatchError>,
) -> ToolResult {
    match outcome {
        Ok(result) => {
            if result.is_error() {
                tracing::info!(tool = %invocation.name, "Tool reported an error");
            }
            result
        }
        Err(e) => {
            tracing::warn!(
                tool = %invocation.name,
                request_id = %invocation.request_id,
                error = %e,
                "Tool call failed"
            );
            ToolResult::Error {
                message: e.to_string(),
                content: vec![ContentBlock::text(format!("Error: {}", e))],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Turn, TurnKind};
    use crate::testing::{handle, tool, MockProvider, ScriptedModel};
    use crate::types::RequestId;
    use serde_json::{json, Map};

    fn call(name: &str) -> ToolInvocation {
        ToolInvocation::new(name, Map::new())
    }

    async fn orchestrator(
        model: Arc<ScriptedModel>,
        providers: Vec<(&str, Arc<MockProvider>)>,
    ) -> Orchestrator {
        let handles = providers.into_iter().map(|(id, p)| handle(id, p)).collect();
        let aggregator = Aggregator::build(handles)
            .await
            .with_call_timeout(Duration::from_secs(5));
        Orchestrator::new(model, aggregator)
    }

    fn kinds(turns: &[Turn]) -> Vec<&'static str> {
        turns
            .iter()
            .map(|t| match t.kind {
                TurnKind::User { .. } => "user",
                TurnKind::Model { .. } => "model",
                TurnKind::ToolRequest { .. } => "tool_request",
                TurnKind::ToolResult { .. } => "tool_result",
            })
            .collect()
    }

    fn result_at(orchestrator: &Orchestrator, index: usize) -> ToolResult {
        match &orchestrator.state().turns()[index].kind {
            TurnKind::ToolResult { result, .. } => result.clone(),
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_tables_end_to_end() {
        let db = MockProvider::new(vec![tool("execute-sql"), tool("list-tables")]).with_response(
            "list-tables",
            ToolResult::Success(vec![ContentBlock::text("users\norders")]),
        );
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("list-tables")])),
            Ok(ModelReply::Text("There are two tables: users and orders.".to_string())),
        ]));
        let mut orch = orchestrator(model.clone(), vec![("postgres", db.clone())]).await;

        let answer = orch.handle_user_input("What tables do we have?").await.unwrap();

        assert_eq!(answer, "There are two tables: users and orders.");
        assert_eq!(
            kinds(orch.state().turns()),
            vec!["user", "tool_request", "tool_result", "model"]
        );
        assert_eq!(result_at(&orch, 2).text(), "users\norders");
        assert_eq!(orch.phase(), Phase::AwaitingUserInput);
        assert_eq!(db.call_count(), 1);

        // The model saw the catalog both times and the tool result the second time
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], (1, vec!["execute-sql".to_string(), "list-tables".to_string()]));
        assert_eq!(requests[1].0, 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_turn() {
        let db = MockProvider::new(vec![tool("execute-sql")]);
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("drop_database")])),
            Ok(ModelReply::Text("I cannot do that.".to_string())),
        ]));
        let mut orch = orchestrator(model, vec![("postgres", db.clone())]).await;

        orch.handle_user_input("drop it").await.unwrap();

        let result = result_at(&orch, 2);
        assert!(result.is_error());
        assert!(result.text().contains("unknown tool: drop_database"));
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tool_error_does_not_end_session() {
        let db = MockProvider::new(vec![tool("execute-sql")]).with_response(
            "execute-sql",
            ToolResult::error("syntax error at or near \"SELEC\""),
        );
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("execute-sql")])),
            Ok(ModelReply::Text("The query had a typo.".to_string())),
            Ok(ModelReply::Text("Sure.".to_string())),
        ]));
        let mut orch = orchestrator(model, vec![("postgres", db)]).await;

        orch.handle_user_input("run SELEC 1").await.unwrap();
        let result = result_at(&orch, 2);
        assert!(result.is_error());
        assert!(result.text().contains("syntax error"));

        let answer = orch.handle_user_input("thanks").await.unwrap();
        assert_eq!(answer, "Sure.");
        assert_eq!(orch.state().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_is_folded_back() {
        let slow = MockProvider::new(vec![tool("list-tables")]).with_delay(Duration::from_secs(600));
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("list-tables")])),
            Ok(ModelReply::Text("The database is not responding.".to_string())),
        ]));
        let mut orch = orchestrator(model, vec![("postgres", slow)]).await;

        let answer = orch.handle_user_input("list tables").await.unwrap();
        assert_eq!(answer, "The database is not responding.");
        assert!(result_at(&orch, 2).text().contains("timed out"));
    }

    #[tokio::test]
    async fn test_batch_results_keep_request_ids() {
        let db = MockProvider::new(vec![tool("list-tables")]);
        let papers = MockProvider::new(vec![tool("search_papers")]);
        let first = call("list-tables");
        let second = ToolInvocation {
            request_id: RequestId("fixed-id".to_string()),
            name: "search_papers".to_string(),
            arguments: json!({"topic": "databases"}).as_object().unwrap().clone(),
        };
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![first.clone(), second.clone()])),
            Ok(ModelReply::Text("done".to_string())),
        ]));
        let mut orch =
            orchestrator(model, vec![("postgres", db.clone()), ("arxiv", papers.clone())]).await;

        orch.handle_user_input("both please").await.unwrap();

        let turns = orch.state().turns();
        assert_eq!(
            kinds(turns),
            vec!["user", "tool_request", "tool_result", "tool_result", "model"]
        );
        let ids: Vec<_> = turns[2..4]
            .iter()
            .map(|t| match &t.kind {
                TurnKind::ToolResult { request_id, .. } => request_id.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![first.request_id, second.request_id]);
        assert_eq!(db.call_count(), 1);
        assert_eq!(papers.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_limit() {
        let db = MockProvider::new(vec![tool("list-tables")]);
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls(vec![call("list-tables")])),
            Ok(ModelReply::ToolCalls(vec![call("list-tables")])),
            Ok(ModelReply::ToolCalls(vec![call("list-tables")])),
        ]));
        let mut orch = orchestrator(model, vec![("postgres", db.clone())])
            .await
            .with_config(OrchestratorConfig {
                max_tool_rounds: 2,
                reconnect: false,
            });

        let err = orch.handle_user_input("loop").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolRoundLimit(2)));
        assert_eq!(db.call_count(), 2);
        assert_eq!(orch.phase(), Phase::AwaitingUserInput);
    }

    struct StalledModel;

    #[async_trait::async_trait]
    impl LanguageModel for StalledModel {
        async fn generate(
            &self,
            _history: &[Turn],
            _catalog: &[ToolDescriptor],
        ) -> Result<ModelReply, ModelError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModelReply::Text("too late".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_returns_to_awaiting_input() {
        let aggregator = Aggregator::build(vec![]).await;
        let mut orch = Orchestrator::new(Arc::new(StalledModel), aggregator)
            .with_model_timeout(Duration::from_secs(10));

        let err = orch.handle_user_input("hello?").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Model(ModelError::Timeout)));
        assert_eq!(orch.phase(), Phase::AwaitingUserInput);
        assert_eq!(orch.state().len(), 1);
    }
}
