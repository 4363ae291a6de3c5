//! Static-settings variant: target configuration comes from a local file,
//! or not at all.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::engine::strategy::{InitContext, InitStrategy};
use crate::error::Result;
use crate::session::SessionState;
use crate::settings::TargetSettings;

pub struct StaticSettingsInit {
    settings_file: Option<PathBuf>,
}

impl StaticSettingsInit {
    pub fn new(settings_file: Option<PathBuf>) -> Self {
        StaticSettingsInit { settings_file }
    }
}

#[async_trait]
impl InitStrategy for StaticSettingsInit {
    async fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        ctx.clear_init().await?;
        if let Some(path) = &self.settings_file {
            let settings = TargetSettings::from_file(path)?;
            info!(file = %path.display(), "pushing local settings file");
            ctx.push_settings(&settings).await?;
        }
        Ok(())
    }

    /// Static settings never go stale.
    fn requires_forced_init(&self, _session: &SessionState) -> bool {
        false
    }

    fn clone_strategy(&self) -> Box<dyn InitStrategy> {
        Box::new(StaticSettingsInit {
            settings_file: self.settings_file.clone(),
        })
    }
}
