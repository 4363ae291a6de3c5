//! The target registry collaborator.
//!
//! The registry is a read-only directory of "searchable" records for a
//! realm. The engine only needs one operation from it, so the seam is a
//! trait; the HTTP implementation here is deliberately thin. Registry
//! unavailability and an empty result set are both fatal configuration
//! errors for the session being initialized.

use std::collections::BTreeMap;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{EngineError, Result};

/// One searchable target, flattened to the single settings-relevant layer of
/// its registry record. All fields are optional strings; settings assembly
/// supplies defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: Option<String>,
    pub z_url: Option<String>,
    pub name: Option<String>,
    pub transform: Option<String>,
    pub element_set: Option<String>,
    pub request_syntax: Option<String>,
    pub record_encoding: Option<String>,
    pub auth: Option<String>,
    pub cf_auth: Option<String>,
    pub cf_subdb: Option<String>,
    pub cf_proxy: Option<String>,

    /// `cclmap_*` fields, keyed by the stripped suffix.
    pub ccl_maps: BTreeMap<String, String>,
    /// `facetmap_*` fields.
    pub facet_maps: BTreeMap<String, String>,
    /// `limitmap_*` fields.
    pub limit_maps: BTreeMap<String, String>,
    /// `sortmap_*` fields.
    pub sort_maps: BTreeMap<String, String>,
    /// `targetmap_*` fields: the "rich database parameters" appended to the
    /// constructed target URL.
    pub database_params: BTreeMap<String, String>,

    pub url_recipe: Option<String>,
    pub use_url_proxy: Option<String>,
    pub use_thumbnails: Option<String>,
    pub full_text_target: Option<String>,
    pub category: Option<String>,
    pub comment: Option<String>,
    pub explode: Option<String>,
    pub secondary_request_syntax: Option<String>,
    pub preferred: Option<String>,
    pub piggyback: Option<String>,
    pub max_records: Option<String>,
    pub extra_args: Option<String>,
    pub query_encoding: Option<String>,
    pub timeout: Option<String>,
    pub session_timeout: Option<String>,
    pub block_timeout: Option<String>,
    pub apdu_log: Option<String>,
    pub sru: Option<String>,
    pub sru_version: Option<String>,
}

impl TargetRecord {
    /// Assign one flattened registry field by element name. Unknown names
    /// are ignored; the registry schema grows faster than this client.
    pub fn apply_field(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        if let Some(suffix) = name.strip_prefix("cclmap_") {
            self.ccl_maps.insert(suffix.to_string(), value.to_string());
            return;
        }
        if let Some(suffix) = name.strip_prefix("facetmap_") {
            self.facet_maps.insert(suffix.to_string(), value.to_string());
            return;
        }
        if let Some(suffix) = name.strip_prefix("limitmap_") {
            self.limit_maps.insert(suffix.to_string(), value.to_string());
            return;
        }
        if let Some(suffix) = name.strip_prefix("sortmap_") {
            self.sort_maps.insert(suffix.to_string(), value.to_string());
            return;
        }
        if let Some(suffix) = name.strip_prefix("targetmap_") {
            self.database_params
                .insert(suffix.to_string(), value.to_string());
            return;
        }
        let value = Some(value.to_string());
        match name {
            "id" => self.id = value,
            "zurl" => self.z_url = value,
            "name" | "displayName" => self.name = value,
            "transform" => self.transform = value,
            "elementSet" => self.element_set = value,
            "requestSyntax" => self.request_syntax = value,
            "recordEncoding" => self.record_encoding = value,
            "authentication" => self.auth = value,
            "cfAuth" => self.cf_auth = value,
            "cfSubDb" => self.cf_subdb = value,
            "cfProxy" => self.cf_proxy = value,
            "urlRecipe" => self.url_recipe = value,
            "useUrlProxy" => self.use_url_proxy = value,
            "useThumbnails" => self.use_thumbnails = value,
            "fullTextTarget" => self.full_text_target = value,
            "categories" => self.category = value,
            "comment" => self.comment = value,
            "explode" => self.explode = value,
            "secondaryRequestSyntax" => self.secondary_request_syntax = value,
            "preferred" => self.preferred = value,
            "piggyback" => self.piggyback = value,
            "maxRecords" => self.max_records = value,
            "extraArgs" => self.extra_args = value,
            "queryEncoding" => self.query_encoding = value,
            "timeout" => self.timeout = value,
            "sessionTimeout" => self.session_timeout = value,
            "blockTimeout" => self.block_timeout = value,
            "apduLog" => self.apdu_log = value,
            "sru" => self.sru = value,
            "sruVersion" => self.sru_version = value,
            other => debug!(field = other, "ignoring unknown registry field"),
        }
    }
}

/// Read-only view of the registry. Implemented over HTTP in production and
/// by stubs in tests.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    /// Fetch the realm's searchable records, optionally narrowed by an
    /// opaque selection query (the client's target-selection query string).
    async fn searchables(&self, selection: Option<&str>) -> Result<Vec<TargetRecord>>;
}

/// HTTP implementation of [`TargetDirectory`].
pub struct HttpTargetDirectory {
    http: reqwest::Client,
    config: RegistryConfig,
}

impl HttpTargetDirectory {
    pub fn new(http: reqwest::Client, config: RegistryConfig) -> Self {
        HttpTargetDirectory { http, config }
    }

    fn records_url(&self, selection: Option<&str>) -> Result<url::Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EngineError::configuration("registry base URL cannot be a base"))?
            .push(&self.config.realm)
            .push("records")
            .push("searchable");
        let query = match (&self.config.query, selection) {
            (Some(fixed), Some(sel)) => Some(format!("{fixed}&{sel}")),
            (Some(fixed), None) => Some(fixed.clone()),
            (None, Some(sel)) => Some(sel.to_string()),
            (None, None) => None,
        };
        url.set_query(query.as_deref());
        Ok(url)
    }
}

#[async_trait]
impl TargetDirectory for HttpTargetDirectory {
    async fn searchables(&self, selection: Option<&str>) -> Result<Vec<TargetRecord>> {
        let url = self.records_url(selection)?;
        debug!(%url, "fetching searchable records");
        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            EngineError::Configuration(format!("registry unreachable at {url}: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(EngineError::Configuration(format!(
                "registry answered {} for {url}",
                response.status()
            )));
        }
        let body = response.text().await.map_err(|e| {
            EngineError::Configuration(format!("registry response unreadable: {e}"))
        })?;
        let records = parse_records(&body)?;
        if records.is_empty() {
            return Err(EngineError::configuration(
                "registry returned no searchable records for this realm",
            ));
        }
        Ok(records)
    }
}

/// Parse a `<records><record>…</record>…</records>` document. Every leaf
/// element inside a record contributes one flattened field; a wrapping
/// `<layer>` element is transparent.
pub fn parse_records(xml: &str) -> Result<Vec<TargetRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut records = Vec::new();
    let mut current: Option<TargetRecord> = None;
    let mut field: Option<String> = None;
    loop {
        match reader
            .read_event()
            .map_err(pansearch_protocol::wire::ParseError::Xml)?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "record" {
                    current = Some(TargetRecord::default());
                    field = None;
                } else if current.is_some() && name != "layer" {
                    field = Some(name);
                }
            }
            Event::Text(t) => {
                if let (Some(record), Some(name)) = (current.as_mut(), field.as_ref()) {
                    let value = t
                        .unescape()
                        .map_err(pansearch_protocol::wire::ParseError::Xml)?;
                    record.apply_field(name, value.trim());
                }
            }
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == b"record" {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                } else {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(records)
}
