//! 工作流集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use gaplens::agents::AgentRunner;
    use gaplens::data::StaticDataSource;
    use gaplens::llm::{
        FailingLlmClient, LlmClient, LlmError, Message, MockLlmClient, ModelResponse, ScriptedLlmClient,
    };
    use gaplens::memory::{FileSessionStore, InMemorySessionStore, SessionMemory, SessionStore};
    use gaplens::recovery::RecoveryPipeline;
    use gaplens::schema::{Intent, RecoveryStatus, SchemaRegistry};
    use gaplens::workflow::{RoutingMode, RunRequest, Stage, StateMachine, StepMarker, WorkflowDriver};
    use gaplens::EngineError;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn runner(llm: Arc<dyn LlmClient>) -> AgentRunner {
        AgentRunner::new(
            llm,
            Arc::new(StaticDataSource::sample()),
            RecoveryPipeline::new(Arc::new(SchemaRegistry::new())),
        )
    }

    fn driver_with(llm: Arc<dyn LlmClient>, store: Arc<dyn SessionStore>) -> WorkflowDriver {
        WorkflowDriver::new(runner(llm), StateMachine::deterministic(), store)
    }

    /// 保存总是失败的存储
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn save(&self, _session: &SessionMemory) -> Result<String, EngineError> {
            Err(EngineError::Storage("disk full".to_string()))
        }

        async fn load(&self, session_id: &str) -> Result<SessionMemory, EngineError> {
            Err(EngineError::SessionNotFound(session_id.to_string()))
        }

        async fn list(&self) -> Result<Vec<String>, EngineError> {
            Ok(Vec::new())
        }
    }

    /// 每次调用都卡很久的客户端
    struct StalledClient;

    #[async_trait]
    impl LlmClient for StalledClient {
        async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ModelResponse::new("{}"))
        }
    }

    #[tokio::test]
    async fn test_full_run_with_mock() {
        let store = Arc::new(InMemorySessionStore::new());
        let driver = driver_with(Arc::new(MockLlmClient), store.clone());

        let outcome = driver
            .run(RunRequest::new("Which Python engineers could pick up AWS for the migration?"))
            .await
            .unwrap();

        let state = &outcome.state;
        assert_eq!(state.intent, Some(Intent::SkillGapAnalysis));
        assert_eq!(state.analysis.as_ref().unwrap().skill_gaps, vec!["AWS".to_string()]);
        assert!(state.decision.is_some());
        assert_eq!(state.step, Some(StepMarker::complete(Stage::Decision)));
        for stage in Stage::ALL {
            assert_ne!(state.stage_status[&stage], RecoveryStatus::Fallback);
        }

        let session = &outcome.session;
        assert_eq!(outcome.stages_executed, 3);
        let agents: Vec<&str> = session.entries().iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(agents, vec!["perception", "analysis", "decision"]);
        assert!(session.entries().iter().all(|e| e.confidence >= 0.6));
        assert_eq!(session.get("current_step"), Some(&json!("decision_complete")));

        let summary = session.summary();
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.agents_used, vec!["analysis", "decision", "perception"]);

        let saved = store.load(session.session_id()).await.unwrap();
        assert_eq!(&saved, session);
    }

    #[tokio::test]
    async fn test_total_transport_failure_still_completes() {
        let client = Arc::new(FailingLlmClient::default());
        let driver = driver_with(client.clone(), Arc::new(InMemorySessionStore::new()));

        let outcome = driver.run(RunRequest::new("Who can lead the data team?")).await.unwrap();

        assert_eq!(client.call_count(), 3);
        assert_eq!(outcome.stages_executed, 3);
        assert!(outcome.location.is_some());

        let state = &outcome.state;
        assert_eq!(state.intent, Some(Intent::Unknown));
        assert_eq!(state.normalized_question.as_deref(), Some("Who can lead the data team?"));
        assert!(state.analysis.is_some());
        assert!(state.decision.is_some());
        assert_eq!(state.step, Some(StepMarker::error(Stage::Decision)));
        assert!(state
            .stage_status
            .values()
            .all(|s| *s == RecoveryStatus::Fallback));

        let entries = outcome.session.entries();
        assert_eq!(entries.len(), 3);
        for entry in entries {
            assert_eq!(entry.confidence, 0.1);
            assert_eq!(entry.metadata["status"], "fallback");
            assert!(entry.metadata.contains_key("transport_error"));
        }
    }

    #[tokio::test]
    async fn test_mixed_outcomes_one_entry_per_stage() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Ok(ModelResponse::new("I could not understand the request, sorry.")),
            Err(LlmError::Timeout),
            Ok(ModelResponse::new(
                "```json\n{\"natural_language_summary\": \"Hire a cloud engineer.\"}\n```",
            )),
        ]));
        let driver = driver_with(client.clone(), Arc::new(InMemorySessionStore::new()));

        let outcome = driver.run(RunRequest::new("q").project("P-100")).await.unwrap();

        assert_eq!(outcome.stages_executed, 3);
        assert_eq!(outcome.session.len(), 3);
        assert_eq!(client.call_count(), 3);
        assert_eq!(outcome.state.stage_status[&Stage::Perception], RecoveryStatus::Fallback);
        assert_eq!(outcome.state.stage_status[&Stage::Analysis], RecoveryStatus::Fallback);
        assert!(outcome.state.decision.is_some());

        // 分析阶段的 prompt 针对指定项目
        let calls = client.calls();
        assert!(calls[1][1].content.contains("(ID: P-100)"));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileSessionStore::new(dir.path()));
        let driver = driver_with(Arc::new(MockLlmClient), store.clone());

        let outcome = driver.run(RunRequest::new("Do we have enough React skills?")).await.unwrap();
        let location = outcome.location.clone().unwrap();
        assert!(location.ends_with(".json"));
        assert!(std::path::Path::new(&location).exists());

        let loaded = store.load(outcome.session.session_id()).await.unwrap();
        assert_eq!(loaded, outcome.session);
        assert_eq!(store.list().await.unwrap(), vec![outcome.session.session_id().to_string()]);

        // 同一 id 只能写一次
        assert!(matches!(
            store.save(&outcome.session).await,
            Err(EngineError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_save_failure_keeps_outcome() {
        let driver = driver_with(Arc::new(MockLlmClient), Arc::new(BrokenStore));
        let outcome = driver.run(RunRequest::new("q")).await.unwrap();
        assert!(outcome.location.is_none());
        assert_eq!(outcome.session.len(), 3);
    }

    #[tokio::test]
    async fn test_model_routing_is_not_logged() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient);
        let driver = WorkflowDriver::new(
            runner(llm.clone()),
            StateMachine::new(RoutingMode::Model(llm)),
            Arc::new(InMemorySessionStore::new()),
        );

        let outcome = driver.run(RunRequest::new("Plan AWS upskilling")).await.unwrap();
        assert_eq!(outcome.stages_executed, 3);
        assert_eq!(outcome.session.len(), 3);
        assert_eq!(outcome.state.step, Some(StepMarker::complete(Stage::Decision)));
    }

    #[tokio::test]
    async fn test_cancel_mid_run_writes_nothing() {
        let store = Arc::new(InMemorySessionStore::new());
        let driver = driver_with(Arc::new(StalledClient), store.clone());

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = driver.run_with_cancel(RunRequest::new("q"), token).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(store.list().await.unwrap().is_empty());
    }
}
