//! 工作流驱动：Start → Perception → Analysis → Decision → Done
//!
//! 每次运行独占一个 SessionMemory，运行结束后保存一次。取消只作用于阶段循环，
//! 保存一旦开始就会完成。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::AgentRunner;
use crate::config::{AppConfig, RoutingSetting};
use crate::core::EngineError;
use crate::data::{DataSource, HttpDataSource};
use crate::llm::{create_llm_from_config, create_reasoner_from_config};
use crate::memory::{FileSessionStore, SessionMemory, SessionStore};
use crate::recovery::RecoveryPipeline;
use crate::schema::SchemaRegistry;
use crate::workflow::machine::{PhaseRouter, RoutingMode, StateMachine};
use crate::workflow::types::{Phase, RunOutcome, RunRequest, Stage, WorkflowState};

pub struct WorkflowDriver {
    runner: AgentRunner,
    router: Arc<dyn PhaseRouter>,
    store: Arc<dyn SessionStore>,
}

impl WorkflowDriver {
    pub fn new(runner: AgentRunner, machine: StateMachine, store: Arc<dyn SessionStore>) -> Self {
        Self::with_router(runner, Arc::new(machine), store)
    }

    pub fn with_router(
        runner: AgentRunner,
        router: Arc<dyn PhaseRouter>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            runner,
            router,
            store,
        }
    }

    /// 按配置组装：模型客户端、HTTP 数据源、文件会话存储
    pub fn from_config(cfg: &AppConfig) -> Result<Self, EngineError> {
        let llm = create_llm_from_config(cfg);
        let data: Arc<dyn DataSource> = Arc::new(HttpDataSource::new(&cfg.data)?);
        let pipeline = RecoveryPipeline::new(Arc::new(SchemaRegistry::new()));

        let mut runner = AgentRunner::new(llm.clone(), data, pipeline).verbose(cfg.workflow.verbose);
        if let Some(reasoner) = create_reasoner_from_config(cfg) {
            runner = runner.with_stage_client(Stage::Decision, reasoner);
        }

        let machine = match cfg.workflow.routing {
            RoutingSetting::Deterministic => StateMachine::deterministic(),
            RoutingSetting::Model => StateMachine::new(RoutingMode::Model(llm)),
        };
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&cfg.memory.storage_dir));

        Ok(Self::new(runner, machine, store))
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, EngineError> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// token 在阶段循环中触发时放弃运行并返回 Cancelled，不保存任何东西
    pub async fn run_with_cancel(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let (state, memory, executed) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("run cancelled before save");
                return Err(EngineError::Cancelled);
            }
            result = self.drive_stages(&request) => result?,
        };
        // 循环结束与取消同时发生时以取消为准
        if cancel.is_cancelled() {
            tracing::warn!(session = memory.session_id(), "run cancelled before save");
            return Err(EngineError::Cancelled);
        }

        let location = match self.store.save(&memory).await {
            Ok(location) => Some(location),
            Err(err) => {
                tracing::error!(session = memory.session_id(), error = %err, "failed to save session");
                None
            }
        };

        tracing::info!(
            session = memory.session_id(),
            stages = executed,
            entries = memory.len(),
            "run finished"
        );

        Ok(RunOutcome {
            state,
            session: memory,
            location,
            stages_executed: executed,
        })
    }

    async fn drive_stages(
        &self,
        request: &RunRequest,
    ) -> Result<(WorkflowState, SessionMemory, usize), EngineError> {
        let mut memory = SessionMemory::new();
        let mut state = WorkflowState::from_request(request);
        let bound = Stage::ALL.len();
        let mut executed = 0usize;
        let mut phase = Phase::Start;

        tracing::info!(session = memory.session_id(), question = %request.question, "run started");

        loop {
            let next = self.router.next_phase(&state).await;
            tracing::debug!(from = ?phase, to = ?next, "phase transition");
            phase = next;
            let Some(stage) = phase.stage() else {
                break;
            };
            if executed >= bound {
                return Err(EngineError::Configuration(format!(
                    "stage limit {bound} exceeded while entering {stage}"
                )));
            }
            state = self.runner.run(stage, state, &mut memory).await?;
            executed += 1;
        }

        Ok((state, memory, executed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticDataSource;
    use crate::llm::{LlmClient, MockLlmClient};
    use crate::memory::InMemorySessionStore;
    use async_trait::async_trait;
    use std::time::Duration;

    fn runner(llm: Arc<dyn LlmClient>) -> AgentRunner {
        AgentRunner::new(
            llm,
            Arc::new(StaticDataSource::sample()),
            RecoveryPipeline::new(Arc::new(SchemaRegistry::new())),
        )
    }

    fn driver(llm: Arc<dyn LlmClient>) -> (WorkflowDriver, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        (
            WorkflowDriver::new(runner(llm), StateMachine::deterministic(), store.clone()),
            store,
        )
    }

    /// 永远要求执行分析阶段的路由
    struct StuckRouter;

    #[async_trait]
    impl PhaseRouter for StuckRouter {
        async fn next_phase(&self, _state: &WorkflowState) -> Phase {
            Phase::Analysis
        }
    }

    /// 保存开始时触发取消，然后慢慢写完
    struct CancellingStore {
        inner: InMemorySessionStore,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl SessionStore for CancellingStore {
        async fn save(&self, session: &SessionMemory) -> Result<String, EngineError> {
            self.cancel.cancel();
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.save(session).await
        }

        async fn load(&self, session_id: &str) -> Result<SessionMemory, EngineError> {
            self.inner.load(session_id).await
        }

        async fn list(&self) -> Result<Vec<String>, EngineError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_run_saves_once() {
        let (driver, store) = driver(Arc::new(MockLlmClient));
        let outcome = driver.run(RunRequest::new("Who can learn AWS?")).await.unwrap();

        assert_eq!(outcome.stages_executed, 3);
        assert_eq!(outcome.session.len(), 3);
        let location = outcome.location.unwrap();
        assert!(location.contains(outcome.session.session_id()));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (driver, store) = driver(Arc::new(MockLlmClient));
        let token = CancellationToken::new();
        token.cancel();
        let err = driver
            .run_with_cancel(RunRequest::new("q"), token)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stage_limit_is_enforced() {
        let store = Arc::new(InMemorySessionStore::new());
        let llm = Arc::new(MockLlmClient);
        let driver = WorkflowDriver::with_router(runner(llm), Arc::new(StuckRouter), store.clone());

        let err = driver.run(RunRequest::new("q")).await.unwrap_err();
        match err {
            EngineError::Configuration(msg) => assert!(msg.contains("stage limit 3"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_save_keeps_session() {
        let token = CancellationToken::new();
        let store = Arc::new(CancellingStore {
            inner: InMemorySessionStore::new(),
            cancel: token.clone(),
        });
        let driver = WorkflowDriver::new(
            runner(Arc::new(MockLlmClient)),
            StateMachine::deterministic(),
            store.clone(),
        );

        let outcome = driver.run_with_cancel(RunRequest::new("q"), token).await.unwrap();
        assert!(outcome.location.is_some());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
