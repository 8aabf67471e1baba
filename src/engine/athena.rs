//! AWS Athena engine implementation.
//!
//! Implements the QueryEngine trait on top of `aws-sdk-athena`. Credentials
//! and region come from the standard AWS provider chain.

use async_trait::async_trait;
use aws_sdk_athena::config::Region;
use aws_sdk_athena::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_athena::types::{
    NamedQuery, QueryExecutionContext, QueryExecutionState, ResultConfiguration,
};
use aws_sdk_athena::Client;
use tracing::{debug, info};

use super::{
    ExecutionId, ExecutionStatus, HeaderRow, QueryEngine, QueryState, ResultPage, SavedQuery,
    SavedQuerySummary,
};
use crate::config::AthenaConfig;
use crate::error::{AthenaError, Result};

/// Athena's ceiling for `GetQueryResults` `MaxResults`.
const MAX_RESULTS_PER_PAGE: usize = 1000;

/// Athena's ceiling for `BatchGetNamedQuery` ids per call.
const NAMED_QUERY_BATCH_SIZE: usize = 50;

/// Athena-backed query engine.
#[derive(Debug, Clone)]
pub struct AthenaEngine {
    client: Client,
    workgroup: Option<String>,
    output_location: Option<String>,
    catalog: Option<String>,
}

impl AthenaEngine {
    /// Creates an engine from an existing SDK client.
    pub fn new(client: Client, config: &AthenaConfig) -> Self {
        Self {
            client,
            workgroup: config.workgroup.clone(),
            output_location: config.output_location.clone(),
            catalog: config.catalog.clone(),
        }
    }

    /// Loads AWS configuration from the environment and creates an engine.
    ///
    /// The configured region takes precedence over `AWS_REGION` and profiles.
    pub async fn connect(config: &AthenaConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let region = sdk_config.region().ok_or_else(|| {
            AthenaError::config("No AWS region configured. Set AWS_REGION or [athena] region")
        })?;

        info!(
            region = %region,
            workgroup = config.workgroup.as_deref().unwrap_or("primary"),
            "Athena client initialized"
        );

        Ok(Self::new(Client::new(&sdk_config), config))
    }
}

/// Maps SDK errors onto the crate taxonomy.
///
/// Timeouts, dispatch failures and throttling are transient. Athena reports
/// unknown ids as `InvalidRequestException` with a "not found" message.
fn classify<E>(err: SdkError<E>, operation: &str) -> AthenaError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            AthenaError::transient(format!("{operation}: {}", DisplayErrorContext(&err)))
        }
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            let code = service_err.code().unwrap_or("Unknown");
            let message = service_err.message().unwrap_or(code).to_string();
            match code {
                "ThrottlingException"
                | "TooManyRequestsException"
                | "InternalServerException"
                | "ServiceUnavailableException" => {
                    AthenaError::transient(format!("{operation}: {message}"))
                }
                "ResourceNotFoundException" => AthenaError::not_found(message),
                "InvalidRequestException" if is_missing_resource(&message) => {
                    AthenaError::not_found(message)
                }
                _ => AthenaError::remote(format!("{operation}: {message}")),
            }
        }
        _ => AthenaError::internal(format!("{operation}: {}", DisplayErrorContext(&err))),
    }
}

fn is_missing_resource(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("not found") || message.contains("does not exist")
}

fn map_state(state: Option<&QueryExecutionState>) -> Result<QueryState> {
    match state {
        Some(QueryExecutionState::Queued) => Ok(QueryState::Queued),
        Some(QueryExecutionState::Running) => Ok(QueryState::Running),
        Some(QueryExecutionState::Succeeded) => Ok(QueryState::Succeeded),
        Some(QueryExecutionState::Failed) => Ok(QueryState::Failed),
        Some(QueryExecutionState::Cancelled) => Ok(QueryState::Cancelled),
        other => Err(AthenaError::internal(format!(
            "Unexpected query execution state: {other:?}"
        ))),
    }
}

fn to_saved_query(query: &NamedQuery, fallback_id: &str) -> SavedQuery {
    SavedQuery {
        id: query.named_query_id().unwrap_or(fallback_id).to_string(),
        name: query.name().to_string(),
        database: query.database().to_string(),
        sql: query.query_string().to_string(),
        description: query.description().map(str::to_string),
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    async fn submit(&self, database: &str, sql: &str) -> Result<ExecutionId> {
        let mut context = QueryExecutionContext::builder().database(database);
        if let Some(catalog) = &self.catalog {
            context = context.catalog(catalog);
        }

        // The SDK fills ClientRequestToken, so its own retries never start a
        // second execution.
        let mut request = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(context.build());
        if let Some(workgroup) = &self.workgroup {
            request = request.work_group(workgroup);
        }
        if let Some(location) = &self.output_location {
            request = request.result_configuration(
                ResultConfiguration::builder()
                    .output_location(location)
                    .build(),
            );
        }

        let output = request
            .send()
            .await
            .map_err(|e| classify(e, "StartQueryExecution"))?;

        output
            .query_execution_id()
            .map(ExecutionId::from)
            .ok_or_else(|| AthenaError::internal("StartQueryExecution returned no execution id"))
    }

    async fn status(&self, execution_id: &ExecutionId) -> Result<ExecutionStatus> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id.as_str())
            .send()
            .await
            .map_err(|e| classify(e, "GetQueryExecution"))?;

        let status = output
            .query_execution()
            .and_then(|execution| execution.status())
            .ok_or_else(|| {
                AthenaError::internal(format!("No status returned for {execution_id}"))
            })?;

        let state = map_state(status.state())?;
        let message = match state {
            QueryState::Failed | QueryState::Cancelled => {
                status.state_change_reason().map(str::to_string)
            }
            _ => None,
        };

        Ok(ExecutionStatus { state, message })
    }

    async fn fetch_page(
        &self,
        execution_id: &ExecutionId,
        next_token: Option<&str>,
        page_size: usize,
    ) -> Result<ResultPage> {
        let max_results = page_size.clamp(1, MAX_RESULTS_PER_PAGE) as i32;
        let output = self
            .client
            .get_query_results()
            .query_execution_id(execution_id.as_str())
            .set_next_token(next_token.map(str::to_string))
            .max_results(max_results)
            .send()
            .await
            .map_err(|e| classify(e, "GetQueryResults"))?;

        let next_token = output.next_token().map(str::to_string);
        let Some(result_set) = output.result_set() else {
            return Ok(ResultPage {
                next_token,
                ..ResultPage::default()
            });
        };

        let columns = result_set
            .result_set_metadata()
            .map(|metadata| {
                metadata
                    .column_info()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = result_set
            .rows()
            .iter()
            .map(|row| {
                row.data()
                    .iter()
                    .map(|datum| datum.var_char_value().map(str::to_string))
                    .collect()
            })
            .collect::<Vec<_>>();

        debug!(
            execution_id = %execution_id,
            rows = rows.len(),
            has_more = next_token.is_some(),
            "Fetched result page"
        );

        Ok(ResultPage {
            columns,
            rows,
            next_token,
        })
    }

    async fn get_saved_query(&self, saved_query_id: &str) -> Result<SavedQuery> {
        let output = self
            .client
            .get_named_query()
            .named_query_id(saved_query_id)
            .send()
            .await
            .map_err(|e| classify(e, "GetNamedQuery"))?;

        output
            .named_query()
            .map(|query| to_saved_query(query, saved_query_id))
            .ok_or_else(|| {
                AthenaError::not_found(format!("NamedQuery {saved_query_id} was not found"))
            })
    }

    async fn list_saved_queries(&self) -> Result<Vec<SavedQuerySummary>> {
        let mut ids: Vec<String> = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = self.client.list_named_queries().set_next_token(token.take());
            if let Some(workgroup) = &self.workgroup {
                request = request.work_group(workgroup);
            }
            let output = request
                .send()
                .await
                .map_err(|e| classify(e, "ListNamedQueries"))?;

            ids.extend(output.named_query_ids().iter().cloned());
            match output.next_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        let mut summaries = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(NAMED_QUERY_BATCH_SIZE) {
            let output = self
                .client
                .batch_get_named_query()
                .set_named_query_ids(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| classify(e, "BatchGetNamedQuery"))?;

            summaries.extend(
                output
                    .named_queries()
                    .iter()
                    .map(|query| SavedQuerySummary::from(&to_saved_query(query, ""))),
            );
        }

        Ok(summaries)
    }

    fn header_row(&self) -> HeaderRow {
        HeaderRow::MatchesColumns
    }
}
