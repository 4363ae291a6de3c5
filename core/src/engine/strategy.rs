//! The variant seam of the protocol engine.
//!
//! The retry/bootstrap state machine lives once in [`crate::Engine`]; the
//! two variants differ only in how `init` supplies target configuration and
//! in when a nominally-alive session still needs reinitialization.

use async_trait::async_trait;
use tracing::info;

use pansearch_protocol::wire;

use crate::config::InitStrategyKind;
use crate::error::{EngineError, Result};
use crate::session::SessionState;
use crate::settings::TargetSettings;
use crate::transport::BrokerTransport;

/// What a variant's `init` gets to work with: the transport, the resolved
/// service definition, and the session (to bind the fresh broker session id
/// and to read the current search's record filter).
pub struct InitContext<'a> {
    pub transport: &'a BrokerTransport,
    pub service: &'a InitStrategyKind,
    pub session: &'a mut SessionState,
}

impl InitContext<'_> {
    /// Issue a clear init per the resolved service strategy and bind the
    /// fresh broker session id.
    pub async fn clear_init(&mut self) -> Result<()> {
        let response = match self.service {
            InitStrategyKind::ServiceXml(xml) => {
                self.transport
                    .command_with_body("command=init&clear=1", None, "text/xml", xml.clone())
                    .await?
            }
            InitStrategyKind::ServiceId(id) => {
                self.transport
                    .command(
                        &format!("command=init&clear=1&service={}", urlencoding::encode(id)),
                        None,
                    )
                    .await?
            }
            InitStrategyKind::BrokerDefault => {
                self.transport.command("command=init&clear=1", None).await?
            }
        };
        let session_id =
            wire::session_id(&response.body).map_err(EngineError::MalformedResponse)?;
        info!(session_id = %session_id, "broker session initialized");
        self.session.bind(session_id);
        Ok(())
    }

    /// Push a settings payload for the bound session. A settings object with
    /// nothing in it is not pushed.
    pub async fn push_settings(&self, settings: &TargetSettings) -> Result<()> {
        if settings.is_empty() {
            return Ok(());
        }
        self.transport
            .command_with_body(
                "command=settings",
                self.session.broker_session_id(),
                "text/xml",
                settings.to_xml(),
            )
            .await?;
        info!("settings pushed to broker");
        Ok(())
    }
}

/// Variant behavior: how target configuration reaches the broker.
#[async_trait]
pub trait InitStrategy: Send + Sync {
    /// (Re)initialize the broker session, including any settings push.
    async fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()>;

    /// Whether the next search must reinitialize even though the session is
    /// nominally alive.
    fn requires_forced_init(&self, session: &SessionState) -> bool;

    /// Clone for a new end-user session. Per-session caches do not travel.
    fn clone_strategy(&self) -> Box<dyn InitStrategy>;
}
