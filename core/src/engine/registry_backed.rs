//! Registry-backed variant: target configuration is rebuilt from the
//! registry and the current record filter is re-applied on every init.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::assembly::assemble;
use crate::config::AssemblyPolicy;
use crate::engine::strategy::{InitContext, InitStrategy};
use crate::error::Result;
use crate::registry::TargetDirectory;
use crate::session::SessionState;
use crate::settings::TargetSettings;

pub struct RegistryBackedInit {
    directory: Arc<dyn TargetDirectory>,
    policy: AssemblyPolicy,
    /// Assembled settings for this session, keyed by the target-selection
    /// query they were fetched under. A changed selection forces a refetch;
    /// the cache never crosses session boundaries.
    cached: Option<(Option<String>, TargetSettings)>,
}

impl RegistryBackedInit {
    pub fn new(directory: Arc<dyn TargetDirectory>, policy: AssemblyPolicy) -> Self {
        RegistryBackedInit {
            directory,
            policy,
            cached: None,
        }
    }
}

#[async_trait]
impl InitStrategy for RegistryBackedInit {
    async fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        ctx.clear_init().await?;

        let selection = ctx
            .session
            .current_search()
            .and_then(|cmd| cmd.target_selection_query())
            .map(str::to_string);
        let stale = match &self.cached {
            Some((cached_selection, _)) => cached_selection != &selection,
            None => true,
        };
        if stale {
            debug!(selection = selection.as_deref().unwrap_or(""), "fetching target settings from registry");
            let records = self.directory.searchables(selection.as_deref()).await?;
            let settings = assemble(&records, &self.policy);
            self.cached = Some((selection, settings));
        }

        // Filter re-application happens whether or not settings were just
        // fetched: the filter can change between searches on the same set.
        if let Some((_, settings)) = self.cached.as_mut() {
            match ctx.session.current_search().and_then(|cmd| {
                cmd.record_filter().map(|f| {
                    (
                        f.to_string(),
                        cmd.record_filter_target_criteria().map(str::to_string),
                    )
                })
            }) {
                Some((filter, criteria)) => {
                    settings.set_record_filter(&filter, criteria.as_deref());
                }
                None => settings.clear_record_filter(),
            }
            ctx.push_settings(settings).await?;
        }
        Ok(())
    }

    /// Reinitialize when the target selection or the record filter moved
    /// since the previous search.
    fn requires_forced_init(&self, session: &SessionState) -> bool {
        session.targets_changed() || session.record_filter_changed()
    }

    fn clone_strategy(&self) -> Box<dyn InitStrategy> {
        Box::new(RegistryBackedInit {
            directory: Arc::clone(&self.directory),
            policy: self.policy.clone(),
            cached: None,
        })
    }
}
