// src/export.rs

use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};
use url::form_urlencoded;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::decode::{decode_records, Record};
use crate::error::Result;
use crate::protocol::QueryHandler;
use crate::transport::{ReqwestTransport, Transport};

pub const REPORT_PATH: &str = "/export/v2/report";
pub const QUERY_PATH: &str = "/export/v2/query";

/// `report_id` as a single percent-encoded path segment, so `/`, `?`, `#`
/// and spaces can neither change the route nor desync the signed path from
/// the URL that is sent.
fn report_path(report_id: &str) -> String {
    let segment: String = form_urlencoded::byte_serialize(report_id.as_bytes())
        .map(|chunk| if chunk == "+" { "%20" } else { chunk })
        .collect();
    format!("{}/{}", REPORT_PATH, segment)
}

/// Named parameters, paging and ordering shared by reports and queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOptions {
    pub parameters: Map<String, Value>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order: Vec<Value>,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order: impl Into<Value>) -> Self {
        self.order.push(order.into());
        self
    }
}

/// Wire body. `query` is only present for ad-hoc queries.
#[derive(Serialize)]
struct ExportBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    parameters: &'a Map<String, Value>,
    limit: Option<u64>,
    offset: Option<u64>,
    order: &'a [Value],
}

impl<'a> ExportBody<'a> {
    fn new(query: Option<&'a str>, opts: &'a ExportOptions) -> Self {
        Self {
            query,
            parameters: &opts.parameters,
            limit: opts.limit,
            offset: opts.offset,
            order: &opts.order,
        }
    }
}

/// Runs saved reports and ad-hoc SQL queries, returning header-keyed records.
pub struct ExportClient<T, C = SystemClock> {
    handler: QueryHandler<T, C>,
}

impl ExportClient<ReqwestTransport, SystemClock> {
    /// Credentials and timeout from `config`, over HTTPS with reqwest.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let credentials = config.credentials()?;
        let transport = ReqwestTransport::with_timeout(config.timeout())
            .context("building HTTP client")?;
        Ok(Self::new(QueryHandler::new(credentials, transport)))
    }
}

impl<T: Transport, C: Clock> ExportClient<T, C> {
    pub fn new(handler: QueryHandler<T, C>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &QueryHandler<T, C> {
        &self.handler
    }

    /// Run a saved report by id.
    ///
    /// Only reports written in expert (raw SQL) mode are supported; for
    /// reports built in the simple editor the server's handling of
    /// `parameters` is undefined and so is the result.
    #[instrument(level = "info", skip(self, opts))]
    pub async fn custom_report(&self, report_id: &str, opts: &ExportOptions) -> Result<Vec<Record>> {
        let path = report_path(report_id);
        let body = self
            .handler
            .call(&path, &ExportBody::new(None, opts))
            .await?;
        let records = decode_records(&String::from_utf8_lossy(&body));
        info!(records = records.len(), "report decoded");
        Ok(records)
    }

    /// Run an ad-hoc SQL query.
    ///
    /// Untrusted values belong in `opts.parameters`, never spliced into `sql`.
    #[instrument(level = "info", skip(self, sql, opts), fields(sql_len = sql.len()))]
    pub async fn custom_query(&self, sql: &str, opts: &ExportOptions) -> Result<Vec<Record>> {
        let body = self
            .handler
            .call(QUERY_PATH, &ExportBody::new(Some(sql), opts))
            .await?;
        let records = decode_records(&String::from_utf8_lossy(&body));
        info!(records = records.len(), "query decoded");
        Ok(records)
    }
}
