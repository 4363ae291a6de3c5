//! The protocol engine: the command-execution state machine.
//!
//! One [`Engine`] owns one broker session. A session moves between three
//! states: unbound (no broker session id), bound and alive, and bound but
//! reported dead by the broker (any code-1 error). Commands run in terms of
//! that state plus the variant's forced-init signal.
//!
//! Callers must serialize command execution per engine. Retries are
//! sequential; a slow broker can make one `execute_command` take the sum of
//! all attempted requests, since cancellation is delegated entirely to the
//! HTTP client's timeouts.

mod registry_backed;
mod static_settings;
mod strategy;

pub use registry_backed::RegistryBackedInit;
pub use static_settings::StaticSettingsInit;
pub use strategy::{InitContext, InitStrategy};

use std::sync::Arc;

use tracing::{debug, info, warn};

use pansearch_protocol::{Command, Verb, wire};

use crate::cache::ResultsCache;
use crate::config::{EngineConfig, EngineMode, InitStrategyKind};
use crate::error::{EngineError, Result};
use crate::registry::{HttpTargetDirectory, TargetDirectory};
use crate::session::SessionState;
use crate::sink::ResponseSink;
use crate::transport::{BrokerResponse, BrokerTransport};

/// Status and content type of a completed command; the body has already
/// been written to the caller's sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub status_code: u16,
    pub content_type: String,
}

impl ExecuteOutcome {
    fn ok(content_type: String) -> Self {
        ExecuteOutcome {
            status_code: 200,
            content_type,
        }
    }

    fn error_envelope() -> Self {
        ExecuteOutcome {
            status_code: 417,
            content_type: "text/xml".to_string(),
        }
    }
}

pub struct Engine {
    transport: BrokerTransport,
    session: SessionState,
    cache: ResultsCache,
    service: InitStrategyKind,
    strategy: Box<dyn InitStrategy>,
    max_record_retries: Option<u32>,
}

impl Engine {
    /// Build an engine from configuration. The registry collaborator may be
    /// supplied explicitly (tests do); otherwise registry-backed mode
    /// constructs the HTTP directory from `config.registry`.
    pub fn from_config(
        config: EngineConfig,
        directory: Option<Arc<dyn TargetDirectory>>,
    ) -> Result<Self> {
        let EngineConfig {
            broker,
            service,
            mode,
            settings_file,
            registry,
            policy,
            max_record_retries,
        } = config;
        let service = service.resolve()?;
        let http = reqwest::Client::new();
        let strategy: Box<dyn InitStrategy> = match mode {
            EngineMode::StaticSettings => Box::new(StaticSettingsInit::new(settings_file)),
            EngineMode::RegistryBacked => {
                let directory = match directory {
                    Some(directory) => directory,
                    None => {
                        let registry = registry.ok_or_else(|| {
                            EngineError::configuration(
                                "registry-backed mode requires registry configuration",
                            )
                        })?;
                        Arc::new(HttpTargetDirectory::new(http.clone(), registry))
                    }
                };
                Box::new(RegistryBackedInit::new(directory, policy))
            }
        };
        Ok(Engine {
            transport: BrokerTransport::new(http, broker),
            session: SessionState::new(),
            cache: ResultsCache::new(),
            service,
            strategy,
            max_record_retries,
        })
    }

    /// Derive a fresh engine for a new end-user session from this one.
    /// Session state, results cache, and the variant's settings cache all
    /// start empty; configuration and collaborators are shared.
    pub fn clone_for_session(&self) -> Self {
        Engine {
            transport: self.transport.clone(),
            session: SessionState::new(),
            cache: ResultsCache::new(),
            service: self.service.clone(),
            strategy: self.strategy.clone_strategy(),
            max_record_retries: self.max_record_retries,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn cache(&self) -> &ResultsCache {
        &self.cache
    }

    /// Single record from the cached `show` result, re-labeled as a
    /// standalone record fragment.
    pub fn get_hit(&self, recid: &str) -> Option<String> {
        self.cache.get_hit(recid)
    }

    /// Execute one command: write the response body to `sink` and return
    /// its status and content type. Application errors the engine cannot
    /// recover from are rendered into the sink as a 417 envelope; transport
    /// and configuration failures (and unrecovered session-dead /
    /// record-missing errors) are returned as `Err`.
    pub async fn execute_command(
        &mut self,
        cmd: &Command,
        sink: &mut dyn ResponseSink,
    ) -> Result<ExecuteOutcome> {
        match cmd.verb() {
            Verb::Search => self.execute_search(cmd, sink).await,
            _ => self.execute_other(cmd, sink).await,
        }
    }

    async fn execute_search(
        &mut self,
        cmd: &Command,
        sink: &mut dyn ResponseSink,
    ) -> Result<ExecuteOutcome> {
        self.session.record_search(cmd.clone());
        self.cache.next_search_ordinal();

        // Identical consecutive searches are free: answer from here without
        // touching the broker, as long as the session is live and nothing
        // forces a reinit.
        if !self.session.search_changed()
            && !self.strategy.requires_forced_init(&self.session)
            && self.session.is_bound()
        {
            debug!("identical consecutive search; answering without the broker");
            sink.write_body(wire::SEARCH_OK.as_bytes())?;
            self.cache
                .store("search", wire::SEARCH_OK, "text/xml", sink.is_buffered());
            return Ok(ExecuteOutcome::ok("text/xml".to_string()));
        }

        if !self.session.is_bound() {
            self.bootstrap_session(cmd.verb()).await?;
        } else if self.strategy.requires_forced_init(&self.session) {
            info!("search context changed; reinitializing live session");
            self.init().await?;
        }

        let result = match self.send(cmd).await {
            Err(e) if e.is_session_dead() => {
                self.session.drop_broker_session();
                self.bootstrap_session(cmd.verb()).await?;
                // One more try. A second dead-session error propagates.
                self.send(cmd).await
            }
            other => other,
        };
        self.finish(cmd, sink, result)
    }

    async fn execute_other(
        &mut self,
        cmd: &Command,
        sink: &mut dyn ResponseSink,
    ) -> Result<ExecuteOutcome> {
        // Verbs outside the known set are forwarded untouched and never
        // trigger bootstrap logic.
        if !cmd.verb().replays_on_bootstrap() {
            let result = self.send(cmd).await;
            return self.finish(cmd, sink, result);
        }

        if cmd.verb().is_record() && self.session.current_search().is_none() {
            self.bootstrap_record(cmd).await?;
        }

        let mut result = self.send(cmd).await;

        if matches!(&result, Err(e) if e.is_session_dead()) {
            self.session.drop_broker_session();
            self.bootstrap_session(cmd.verb()).await?;
            result = self.send(cmd).await;
            if matches!(&result, Err(e) if e.is_record_missing()) && cmd.record_query().is_some()
            {
                self.bootstrap_record(cmd).await?;
                result = self.send(cmd).await;
            }
        }

        if matches!(&result, Err(e) if e.is_record_missing()) && cmd.record_query().is_some() {
            result = self.retry_missing_record(cmd).await;
        }

        self.finish(cmd, sink, result)
    }

    /// The missing-record recovery loop: bootstrap the record context, then
    /// retry while the broker still reports active clients. Bounded only by
    /// the active-client count converging to zero, unless a retry cap is
    /// configured.
    async fn retry_missing_record(&mut self, cmd: &Command) -> Result<BrokerResponse> {
        self.bootstrap_record(cmd).await?;
        let mut attempts: u32 = 0;
        loop {
            match self.send(cmd).await {
                Err(e) if e.is_record_missing() => {
                    attempts += 1;
                    if let Some(cap) = self.max_record_retries {
                        if attempts >= cap {
                            warn!(attempts, "missing-record retry cap reached; giving up");
                            return Err(e);
                        }
                    }
                    let active = self
                        .cache
                        .get("show")
                        .and_then(|show| wire::parse_active_clients(&show).ok())
                        .unwrap_or(0);
                    if active == 0 {
                        debug!("no active clients left; record is definitively missing");
                        return Err(e);
                    }
                    debug!(active, "record still settling; re-running show");
                    self.run_show().await?;
                }
                other => return other,
            }
        }
    }

    /// Reinitialize a dead session: init per the variant, then replay the
    /// prior search and run a `show` to repopulate result context. Search
    /// commands skip the replay (the command being dispatched is the
    /// replay). Calling this on a live session is a warned no-op.
    async fn bootstrap_session(&mut self, verb: &Verb) -> Result<()> {
        if self.session.is_bound() {
            warn!(verb = %verb, "bootstrap requested for a live session; ignoring");
            return Ok(());
        }
        info!(verb = %verb, "bootstrapping broker session");
        self.init().await?;
        if verb.replays_on_bootstrap() {
            if let Some(prior) = self.session.current_search() {
                self.transport
                    .command(prior.cleaned_query(), self.session.broker_session_id())
                    .await?;
                self.run_show().await?;
            }
        }
        Ok(())
    }

    /// Rebuild record context from the command's own search query: record
    /// it, make sure the session is alive, run the search and a `show`.
    /// Without a record query this is a warned no-op; callers check first.
    async fn bootstrap_record(&mut self, cmd: &Command) -> Result<()> {
        let Some(query) = cmd.record_query() else {
            warn!("record bootstrap requested without a record query; ignoring");
            return Ok(());
        };
        let search_cmd = Command::from_query(query);
        info!(query = search_cmd.cleaned_query(), "bootstrapping record context");
        self.session.record_search(search_cmd.clone());
        self.cache.next_search_ordinal();
        if !self.session.is_bound() {
            self.init().await?;
        }
        self.transport
            .command(search_cmd.cleaned_query(), self.session.broker_session_id())
            .await?;
        self.run_show().await?;
        Ok(())
    }

    async fn init(&mut self) -> Result<()> {
        let strategy = &mut self.strategy;
        let mut ctx = InitContext {
            transport: &self.transport,
            service: &self.service,
            session: &mut self.session,
        };
        strategy.init(&mut ctx).await
    }

    async fn send(&self, cmd: &Command) -> Result<BrokerResponse> {
        self.transport
            .command(cmd.cleaned_query(), self.session.broker_session_id())
            .await
    }

    async fn run_show(&mut self) -> Result<BrokerResponse> {
        let response = self
            .transport
            .command("command=show&block=1", self.session.broker_session_id())
            .await?;
        self.cache
            .store("show", &response.body, &response.content_type, true);
        Ok(response)
    }

    /// Common command epilogue. Success delivers and caches the body.
    /// Unrecovered session-dead and record-missing errors propagate, as do
    /// transport failures (after resetting search provenance); any other
    /// application error resets provenance and is rendered as a 417 body.
    fn finish(
        &mut self,
        cmd: &Command,
        sink: &mut dyn ResponseSink,
        result: Result<BrokerResponse>,
    ) -> Result<ExecuteOutcome> {
        match result {
            Ok(response) => {
                sink.write_body(response.body.as_bytes())?;
                self.cache.store(
                    cmd.verb().as_str(),
                    &response.body,
                    &response.content_type,
                    sink.is_buffered(),
                );
                Ok(ExecuteOutcome::ok(response.content_type))
            }
            Err(e) if e.is_session_dead() => {
                self.session.drop_broker_session();
                Err(e)
            }
            Err(e) if e.is_record_missing() => Err(e),
            Err(EngineError::Broker(envelope)) => {
                debug!(code = envelope.code, "rendering application error as 417");
                self.session.reset();
                sink.write_body(envelope.to_xml().as_bytes())?;
                Ok(ExecuteOutcome::error_envelope())
            }
            Err(e) => {
                self.session.reset();
                Err(e)
            }
        }
    }
}
