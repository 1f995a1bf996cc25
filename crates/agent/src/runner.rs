//! The generation loop.
//!
//! A run alternates between asking the model for a plan and calling the
//! endpoint the model asked for, until the model declares the dashboard
//! finished or the iteration ceiling is reached:
//!
//! ```text
//! AwaitingModel ──response──▶ HavePlan ──finished──▶ Done
//!       ▲                        │
//!       │                    fetch more
//!       │                        ▼
//!       └────────────────── CallingEndpoint
//! ```
//!
//! Only an unreachable model, an unparseable response or a fetch request
//! without a usable endpoint/body abort a run. Endpoint failures are fed
//! back to the model like any other response.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tilecast_config::{AppConfig, DashboardConfig};
use tilecast_core::event::{DomainEvent, EventBus};
use tilecast_core::{
    ApiCatalog, DashboardPlan, Decision, EndpointInvoker, FetchRequest, ModelClient, RunError,
    StructuredRequest, validate,
};
use tracing::{debug, info, warn};

use crate::context::IterationContext;
use crate::invoker::HttpInvoker;
use crate::parser::{ParsedResponse, parse_response};
use crate::prompt::{BOOTSTRAP_PROMPT, CONTINUE_PROMPT, build_instructions, response_schema};

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The model declared the dashboard finished.
    Completed(DashboardPlan),
    /// The ceiling was hit while the model still wanted data. Holds the
    /// layout of the last response.
    CeilingReached(DashboardPlan),
    /// The run stopped early. `last_plan` is the layout of the violating
    /// response for protocol violations, otherwise the last layout seen
    /// before the failure (if any).
    Aborted {
        error: RunError,
        last_plan: Option<DashboardPlan>,
    },
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Plan evaluations performed.
    pub iterations: u32,
    pub endpoint_calls: u32,
    pub context: IterationContext,
}

impl RunReport {
    /// True when the run reached DONE (finished or ceiling).
    pub fn is_done(&self) -> bool {
        !matches!(self.outcome, RunOutcome::Aborted { .. })
    }

    pub fn error(&self) -> Option<&RunError> {
        match &self.outcome {
            RunOutcome::Aborted { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The plan the run yields, if any.
    ///
    /// A model or parse failure yields nothing; a protocol violation yields
    /// the violating response's layout.
    pub fn into_plan(self) -> Option<DashboardPlan> {
        match self.outcome {
            RunOutcome::Completed(plan) | RunOutcome::CeilingReached(plan) => Some(plan),
            RunOutcome::Aborted {
                error: RunError::ProtocolViolation { .. },
                last_plan,
            } => last_plan,
            RunOutcome::Aborted { .. } => None,
        }
    }
}

enum State {
    AwaitingModel { prompt: &'static str },
    HavePlan(ParsedResponse),
    CallingEndpoint {
        request: FetchRequest,
        layout: DashboardPlan,
    },
}

/// Drives dashboard generation runs against one model client.
pub struct DashboardAgent {
    model: Arc<dyn ModelClient>,
    model_name: String,
    temperature: Option<f32>,
    max_iterations: u32,
    endpoints: DashboardConfig,
    invoker: Option<Arc<dyn EndpointInvoker>>,
    event_bus: Arc<EventBus>,
}

impl DashboardAgent {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            temperature: None,
            max_iterations: 10,
            endpoints: DashboardConfig::default(),
            invoker: None,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Agent using the configured model name, temperature and loop settings.
    pub fn from_config(model: Arc<dyn ModelClient>, config: &AppConfig) -> Self {
        let model_name = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());

        Self::new(model, model_name)
            .with_temperature(config.default_temperature)
            .with_max_iterations(config.dashboard.max_iterations)
            .with_endpoints(config.dashboard.clone())
    }

    /// Set the iteration ceiling (at least 1).
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Endpoint base URL, timeout and policy for the per-run HTTP invoker.
    pub fn with_endpoints(mut self, endpoints: DashboardConfig) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Use a fixed invoker instead of building an [`HttpInvoker`] per run.
    pub fn with_invoker(mut self, invoker: Arc<dyn EndpointInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Run one generation. Runs share nothing; concurrent calls are fine.
    pub async fn run(&self, preferences: Option<&Value>, apis: Option<&ApiCatalog>) -> RunReport {
        let invoker: Arc<dyn EndpointInvoker> = match &self.invoker {
            Some(invoker) => Arc::clone(invoker),
            None => Arc::new(HttpInvoker::from_config(
                &self.endpoints,
                apis.cloned().unwrap_or_default(),
            )),
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            model = %self.model_name,
            apis = apis.map_or(0, ApiCatalog::len),
            max_iterations = self.max_iterations,
            "Starting dashboard run"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            run_id: run_id.clone(),
            apis_available: apis.map_or(0, ApiCatalog::len),
            timestamp: Utc::now(),
        });

        let mut context = IterationContext::new();
        let mut iterations = 0u32;
        let mut endpoint_calls = 0u32;
        let mut last_plan: Option<DashboardPlan> = None;
        let mut state = State::AwaitingModel {
            prompt: BOOTSTRAP_PROMPT,
        };

        let outcome = loop {
            state = match state {
                State::AwaitingModel { prompt } => {
                    match self.request_plan(prompt, preferences, apis, &context).await {
                        Ok(parsed) => State::HavePlan(parsed),
                        Err(error) => break RunOutcome::Aborted { error, last_plan },
                    }
                }

                State::HavePlan(parsed) => {
                    iterations += 1;
                    let decision = match parsed.into_decision() {
                        Ok(decision) => decision,
                        Err(RunError::ProtocolViolation { reason, last_plan: layout }) => {
                            let layout = layout.map(|b| *b);
                            break RunOutcome::Aborted {
                                error: RunError::ProtocolViolation {
                                    reason,
                                    last_plan: layout.clone().map(Box::new),
                                },
                                last_plan: layout,
                            };
                        }
                        Err(error) => break RunOutcome::Aborted { error, last_plan },
                    };

                    debug!(run_id = %run_id, iteration = iterations, finished = decision.is_finished(), "Plan evaluated");
                    self.event_bus.publish(DomainEvent::PlanProduced {
                        run_id: run_id.clone(),
                        iteration: iterations,
                        finished: decision.is_finished(),
                        timestamp: Utc::now(),
                    });

                    match decision {
                        Decision::Finished(plan) => break RunOutcome::Completed(self.checked(plan, &run_id)),
                        Decision::FetchMore { layout, .. } if iterations >= self.max_iterations => {
                            warn!(
                                run_id = %run_id,
                                iterations,
                                "Iteration ceiling reached, returning last plan"
                            );
                            break RunOutcome::CeilingReached(layout);
                        }
                        Decision::FetchMore { request, layout } => {
                            State::CallingEndpoint { request, layout }
                        }
                    }
                }

                State::CallingEndpoint { request, layout } => {
                    last_plan = Some(layout);

                    let started = Instant::now();
                    let result = invoker.invoke(&request).await;
                    let duration_ms = started.elapsed().as_millis() as u64;
                    endpoint_calls += 1;

                    debug!(
                        run_id = %run_id,
                        endpoint = request.endpoint(),
                        success = result.success,
                        status = ?result.status_code,
                        duration_ms,
                        "Endpoint called"
                    );
                    self.event_bus.publish(DomainEvent::EndpointCalled {
                        run_id: run_id.clone(),
                        endpoint: request.endpoint().to_string(),
                        success: result.success,
                        status_code: result.status_code,
                        duration_ms,
                        timestamp: Utc::now(),
                    });

                    context.record(request.endpoint(), &request.body_value(), &result);
                    State::AwaitingModel {
                        prompt: CONTINUE_PROMPT,
                    }
                }
            };
        };

        match &outcome {
            RunOutcome::Aborted { error, .. } => {
                warn!(run_id = %run_id, iterations, kind = error.kind(), error = %error, "Dashboard run aborted");
                self.event_bus.publish(DomainEvent::RunAborted {
                    run_id: run_id.clone(),
                    iterations,
                    reason: error.to_string(),
                    timestamp: Utc::now(),
                });
            }
            other => {
                let ceiling_reached = matches!(other, RunOutcome::CeilingReached(_));
                info!(run_id = %run_id, iterations, endpoint_calls, ceiling_reached, "Dashboard run finished");
                self.event_bus.publish(DomainEvent::RunFinished {
                    run_id: run_id.clone(),
                    iterations,
                    ceiling_reached,
                    timestamp: Utc::now(),
                });
            }
        }

        RunReport {
            run_id,
            outcome,
            iterations,
            endpoint_calls,
            context,
        }
    }

    async fn request_plan(
        &self,
        prompt: &str,
        preferences: Option<&Value>,
        apis: Option<&ApiCatalog>,
        context: &IterationContext,
    ) -> Result<ParsedResponse, RunError> {
        let request = StructuredRequest {
            model: self.model_name.clone(),
            instructions: build_instructions(preferences, apis, context),
            prompt: prompt.to_string(),
            schema: response_schema(),
            temperature: self.temperature,
        };

        let text = self.model.generate(request).await?;
        parse_response(&text)
    }

    /// Flag layout violations of a finished plan in its diagnostics.
    fn checked(&self, mut plan: DashboardPlan, run_id: &str) -> DashboardPlan {
        for violation in validate(&plan) {
            warn!(run_id, %violation, "Finished plan violates layout rules");
            plan.diagnostics.push(violation.to_string());
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        RecordingInvoker, ScriptedModel, fetch_response, finished_response,
    };
    use serde_json::json;
    use tilecast_core::{ApiDescriptor, CallResult, Coordinates, ProviderError};

    fn agent(model: ScriptedModel, invoker: RecordingInvoker) -> (DashboardAgent, Arc<ScriptedModel>, Arc<RecordingInvoker>) {
        let model = Arc::new(model);
        let invoker = Arc::new(invoker);
        let agent = DashboardAgent::new(model.clone(), "scripted-1").with_invoker(invoker.clone());
        (agent, model, invoker)
    }

    #[tokio::test]
    async fn immediate_finish_calls_no_endpoint() {
        let (agent, model, invoker) = agent(
            ScriptedModel::new(vec![Ok(finished_response(2, 2, &[("a", "[[0, 0]]")]))]),
            RecordingInvoker::new(),
        );
        let report = agent.run(None, None).await;

        assert!(report.is_done());
        assert_eq!(report.iterations, 1);
        assert_eq!(report.endpoint_calls, 0);
        assert!(invoker.calls().await.is_empty());

        let requests = model.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, BOOTSTRAP_PROMPT);
        assert_eq!(requests[0].model, "scripted-1");

        let plan = report.into_plan().unwrap();
        assert_eq!(plan.tiles[0].coordinates, Coordinates::Parsed(vec![[0, 0]]));
        assert!(plan.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn two_step_run_posts_once_and_returns_second_plan() {
        let (agent, model, invoker) = agent(
            ScriptedModel::new(vec![
                Ok(fetch_response("/api/users", "{'limit': 10}")),
                Ok(finished_response(1, 2, &[("users", "[[0, 0], [0, 1]]")])),
            ]),
            RecordingInvoker::new().respond_with(CallResult::ok(200, r#"{"users": 42}"#)),
        );
        let catalog = ApiCatalog::new().with("/api/users", ApiDescriptor::new("User stats", "{'limit': int}"));
        let report = agent.run(Some(&json!({"focus": "users"})), Some(&catalog)).await;

        let calls = invoker.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].endpoint(), "/api/users");
        assert_eq!(calls[0].body_value(), json!({"limit": 10}));

        assert_eq!(report.context.len(), 1);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.endpoint_calls, 1);

        let requests = model.requests().await;
        assert_eq!(requests[1].prompt, CONTINUE_PROMPT);
        assert!(requests[1].instructions.contains("API Call to /api/users:"));
        assert!(requests[1].instructions.contains("\"users\": 42"));
        assert!(requests[0].instructions.contains("/api/users: User stats"));

        let plan = report.into_plan().unwrap();
        assert_eq!(plan.tiles[0].id, "users");
    }

    #[tokio::test]
    async fn short_finished_key_drives_a_fetch() {
        let first = r#"{"finished": false, "endpoint": "/api/users", "api_body": "{\"limit\": 10}", "gridSize": {}, "tiles": []}"#;
        let (agent, model, invoker) = agent(
            ScriptedModel::new(vec![
                Ok(first.to_string()),
                Ok(finished_response(2, 2, &[("users", "[[0, 0], [1, 0]]")])),
            ]),
            RecordingInvoker::new(),
        );
        let report = agent.run(None, None).await;

        let calls = invoker.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].endpoint(), "/api/users");
        assert_eq!(calls[0].body_value(), json!({"limit": 10}));
        assert_eq!(report.context.len(), 1);
        assert_eq!(model.requests().await.len(), 2);

        assert!(matches!(report.outcome, RunOutcome::Completed(_)));
        let plan = report.into_plan().unwrap();
        assert_eq!(plan.tiles[0].id, "users");
        assert_eq!(plan.tiles[0].coordinates, Coordinates::Parsed(vec![[0, 0], [1, 0]]));
    }

    #[tokio::test]
    async fn ceiling_stops_endless_fetching() {
        let (agent, model, invoker) = agent(
            ScriptedModel::repeating(fetch_response("/api/users", "{'limit': 10}")),
            RecordingInvoker::new(),
        );
        let report = agent.run(None, None).await;

        assert_eq!(report.iterations, 10);
        assert_eq!(model.requests().await.len(), 10);
        assert_eq!(invoker.calls().await.len(), 9);
        assert!(report.is_done());
        assert!(matches!(report.outcome, RunOutcome::CeilingReached(_)));
        assert!(report.into_plan().is_some());
    }

    #[tokio::test]
    async fn custom_ceiling() {
        let (agent, model, invoker) = agent(
            ScriptedModel::repeating(fetch_response("/api/users", "{'limit': 1}")),
            RecordingInvoker::new(),
        );
        let report = agent.with_max_iterations(3).run(None, None).await;
        assert_eq!(report.iterations, 3);
        assert_eq!(model.requests().await.len(), 3);
        assert_eq!(invoker.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn endpoint_failure_is_fed_back() {
        let (agent, model, _invoker) = agent(
            ScriptedModel::new(vec![
                Ok(fetch_response("/api/users", "{'limit': 10}")),
                Ok(finished_response(1, 1, &[("a", "[[0, 0]]")])),
            ]),
            RecordingInvoker::new().respond_with(CallResult::failed("HTTP 500", Some(500), "boom")),
        );
        let report = agent.run(None, None).await;

        assert!(matches!(report.outcome, RunOutcome::Completed(_)));
        let requests = model.requests().await;
        assert!(requests[1].instructions.contains("\"success\": false"));
        assert!(requests[1].instructions.contains("\"status_code\": 500"));
    }

    #[tokio::test]
    async fn fetch_without_body_aborts_with_last_plan() {
        let bad = json!({
            "gridSize": {"rows": 3, "cols": 3},
            "tiles": [],
            "finished_or_make_api_call": false,
            "endpoint": "/api/users",
            "api_body": ""
        })
        .to_string();
        let (agent, _model, invoker) = agent(ScriptedModel::new(vec![Ok(bad)]), RecordingInvoker::new());
        let report = agent.run(None, None).await;

        assert!(!report.is_done());
        assert_eq!(report.error().unwrap().kind(), "protocol_violation");
        assert!(invoker.calls().await.is_empty());
        assert_eq!(report.iterations, 1);
        assert_eq!(report.into_plan().unwrap().grid_size.rows, 3);
    }

    #[tokio::test]
    async fn fetch_without_endpoint_aborts() {
        let bad = json!({
            "gridSize": {"rows": 1, "cols": 1},
            "tiles": [],
            "finished_or_make_api_call": false,
            "endpoint": "",
            "api_body": "{'limit': 10}"
        })
        .to_string();
        let (agent, _model, _invoker) = agent(ScriptedModel::new(vec![Ok(bad)]), RecordingInvoker::new());
        let report = agent.run(None, None).await;
        assert_eq!(report.error().unwrap().kind(), "protocol_violation");
    }

    #[tokio::test]
    async fn model_failure_aborts_without_plan() {
        let (agent, _model, _invoker) = agent(
            ScriptedModel::new(vec![
                Ok(fetch_response("/api/users", "{'limit': 10}")),
                Err(ProviderError::EmptyResponse),
            ]),
            RecordingInvoker::new(),
        );
        let report = agent.run(None, None).await;

        assert_eq!(report.error().unwrap().kind(), "model_unavailable");
        assert_eq!(report.iterations, 1);
        assert!(matches!(
            &report.outcome,
            RunOutcome::Aborted { last_plan: Some(_), .. }
        ));
        assert!(report.into_plan().is_none());
    }

    #[tokio::test]
    async fn malformed_response_aborts_without_plan() {
        let (agent, _model, _invoker) = agent(
            ScriptedModel::new(vec![Ok("{\"gridSize\": ".into())]),
            RecordingInvoker::new(),
        );
        let report = agent.run(None, None).await;
        assert_eq!(report.error().unwrap().kind(), "malformed_response");
        assert_eq!(report.iterations, 0);
        assert!(report.into_plan().is_none());
    }

    #[tokio::test]
    async fn violations_are_flagged_not_fatal() {
        let (agent, _model, _invoker) = agent(
            ScriptedModel::new(vec![Ok(finished_response(
                2,
                2,
                &[("A", "[[0, 0]]"), ("B", "[[0, 0]]"), ("C", "[[5, 5]]"), ("D", "[[0,0")],
            ))]),
            RecordingInvoker::new(),
        );
        let report = agent.run(None, None).await;
        assert!(matches!(report.outcome, RunOutcome::Completed(_)));

        let plan = report.into_plan().unwrap();
        let joined = plan.diagnostics.join("\n");
        assert!(joined.contains("overlap"), "{joined}");
        assert!(joined.contains("outside"), "{joined}");
        assert!(joined.contains("Could not parse coordinates of tile 'D'"), "{joined}");
        assert_eq!(plan.tiles[3].coordinates, Coordinates::Raw("[[0,0".into()));
    }

    #[tokio::test]
    async fn events_trace_the_run() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let (agent, _model, _invoker) = agent(
            ScriptedModel::new(vec![
                Ok(fetch_response("/api/users", "{'limit': 10}")),
                Ok(finished_response(1, 1, &[("a", "[[0, 0]]")])),
            ]),
            RecordingInvoker::new(),
        );
        let report = agent.with_event_bus(bus).run(None, None).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::RunStarted { .. } => "started",
                DomainEvent::PlanProduced { .. } => "plan",
                DomainEvent::EndpointCalled { .. } => "call",
                DomainEvent::RunFinished { run_id, .. } => {
                    assert_eq!(run_id, &report.run_id);
                    "finished"
                }
                DomainEvent::RunAborted { .. } => "aborted",
            });
        }
        assert_eq!(kinds, vec!["started", "plan", "call", "plan", "finished"]);
    }

    #[tokio::test]
    async fn from_config_reads_loop_settings() {
        let mut config = AppConfig::default();
        config.dashboard.max_iterations = 4;
        config.default_model = "gemini-2.5-flash".into();
        let agent = DashboardAgent::from_config(Arc::new(ScriptedModel::new(vec![])), &config);
        assert_eq!(agent.max_iterations(), 4);
        assert_eq!(agent.model_name(), "gemini-2.5-flash");
    }
}
