pub mod error;
pub mod max_depth_rule;

use std::{num::NonZeroUsize, sync::Arc};

use relgraph_config::{ConfigError, EngineConfig};
use relgraph_query_planner::{
    ast::{
        lowering::{lower_operation, Variables},
        selection::Operation,
    },
    planner::{plan_nodes::ExecutionPlan, Planner},
    schema::SchemaRegistry,
    utils::parsing::parse_operation,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::{
    execution::plan::PlanExecutor,
    pipeline::{error::PipelineError, max_depth_rule::validate_max_depth},
    projection::response::project_by_operation,
    response::response::ExecutionResponse,
    store::{BackingStoreBoxedArc, MutationStoreBoxedArc},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<Variables>,
    /// Asks for the execution plan under `extensions.queryPlan`.
    /// Ignored unless `query_planner.allow_expose` is enabled.
    #[serde(default)]
    pub expose_query_plan: bool,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// A lowered operation together with its plan. Nothing has been fetched yet.
pub struct PreparedOperation {
    pub operation: Operation,
    pub plan: ExecutionPlan,
}

/// Serves requests against one schema and one backing store.
///
/// The registry is shared read-only between requests; plans, resolved rows and
/// the in-flight fetch limit all live for a single request.
pub struct QueryEngine {
    registry: Arc<SchemaRegistry>,
    planner: Planner,
    store: BackingStoreBoxedArc,
    mutations: Option<MutationStoreBoxedArc>,
    config: Arc<EngineConfig>,
    max_in_flight_fetches: NonZeroUsize,
}

impl QueryEngine {
    /// Rejects a config that fails [`EngineConfig::validate`], the same way `load_config` does.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        store: BackingStoreBoxedArc,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_in_flight_fetches =
            NonZeroUsize::new(config.traffic_shaping.max_in_flight_fetches).ok_or(
                ConfigError::InvalidValue("traffic_shaping.max_in_flight_fetches must be at least 1"),
            )?;

        let planner = Planner::new(registry.clone(), config.query_planner.max_depth);
        Ok(QueryEngine {
            registry,
            planner,
            store,
            mutations: None,
            config: Arc::new(config),
            max_in_flight_fetches,
        })
    }

    pub fn with_mutations(mut self, mutations: MutationStoreBoxedArc) -> Self {
        self.mutations = Some(mutations);
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse, pre-flight depth check, lowering and planning.
    #[instrument(level = "debug", skip_all, fields(operation_name = ?request.operation_name))]
    pub fn prepare(&self, request: &GraphQLRequest) -> Result<PreparedOperation, PipelineError> {
        let document = parse_operation(&request.query).map_err(|err| {
            error!("Failed to parse GraphQL operation: {}", err);
            PipelineError::FailedToParseOperation(err)
        })?;

        if let Some(rule) = &self.config.limits.max_depth {
            validate_max_depth(&document, rule)?;
        }

        let operation = lower_operation(
            &self.registry,
            &document,
            request.operation_name.as_deref(),
            request.variables.as_ref(),
        )?;
        let plan = self.planner.plan(&operation)?;

        Ok(PreparedOperation { operation, plan })
    }

    pub async fn execute(&self, request: &GraphQLRequest) -> ExecutionResponse {
        self.execute_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Cancelling `cancellation` abandons the request's in-flight fetches.
    #[instrument(level = "debug", skip_all, fields(operation_name = ?request.operation_name))]
    pub async fn execute_with_cancellation(
        &self,
        request: &GraphQLRequest,
        cancellation: &CancellationToken,
    ) -> ExecutionResponse {
        match self.try_execute(request, cancellation).await {
            Ok(response) => response,
            Err(err) => {
                warn!(code = err.graphql_error_code(), error = %err, "request failed");
                ExecutionResponse::from_errors(vec![err.to_graphql_error()])
            }
        }
    }

    async fn try_execute(
        &self,
        request: &GraphQLRequest,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResponse, PipelineError> {
        let prepared = self.prepare(request)?;
        let traffic_shaping = &self.config.traffic_shaping;

        let mut executor = PlanExecutor::new(
            &prepared.plan,
            &self.registry,
            &**self.store,
            self.max_in_flight_fetches,
        )
        .with_cancellation(cancellation)
        .with_timeout(traffic_shaping.request_timeout);
        if let Some(mutations) = &self.mutations {
            executor = executor.with_mutations(&***mutations);
        }

        let resolved = executor.execute().await?;
        let (data, errors) = project_by_operation(&prepared.operation, &prepared.plan, &resolved);

        debug!(
            fetches = resolved.fetches,
            errors = errors.len(),
            "request executed"
        );

        let extensions = if self.config.query_planner.allow_expose && request.expose_query_plan {
            serde_json::to_value(&prepared.plan)
                .ok()
                .map(|plan| json!({ "queryPlan": plan }))
        } else {
            None
        };

        Ok(ExecutionResponse {
            data: Some(data),
            errors,
            extensions,
        })
    }
}
