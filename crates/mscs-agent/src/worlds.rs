use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use mscs_world::{CommandResult, Player, WorldRecord};

use crate::{
    cache::{Cacheable, ResultCache},
    enrich::PropertyEnricher,
    executor::{CommandExecutor, ExecError},
    status,
};

/// What a cached result answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Worlds,
    ServersStatus,
    Players(String),
}

impl Cacheable for Arc<Vec<WorldRecord>> {
    fn worth_caching(&self) -> bool {
        !self.is_empty()
    }
}

impl Cacheable for Arc<CommandResult> {}

impl Cacheable for Arc<Vec<Player>> {}

/// Front door for everything the HTTP layer asks about worlds.
///
/// Status-derived answers are cached until the next sweep; lifecycle commands
/// always go straight to `mscs`.
#[derive(Debug, Clone)]
pub struct WorldService {
    executor: Arc<CommandExecutor>,
    enricher: PropertyEnricher,
    worlds: Arc<ResultCache<QueryKey, Arc<Vec<WorldRecord>>>>,
    status: Arc<ResultCache<QueryKey, Arc<CommandResult>>>,
    rosters: Arc<ResultCache<QueryKey, Arc<Vec<Player>>>>,
}

impl WorldService {
    pub fn new(executor: CommandExecutor, enricher: PropertyEnricher) -> Self {
        Self {
            executor: Arc::new(executor),
            enricher,
            worlds: Arc::new(ResultCache::new()),
            status: Arc::new(ResultCache::new()),
            rosters: Arc::new(ResultCache::new()),
        }
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Every world `mscs status` reports, enriched with its server properties.
    pub async fn worlds(&self) -> Result<Arc<Vec<WorldRecord>>, ExecError> {
        self.worlds
            .get_or_compute(QueryKey::Worlds, || self.load_worlds())
            .await
    }

    async fn load_worlds(&self) -> Result<Arc<Vec<WorldRecord>>, ExecError> {
        let result = self.executor.execute("", "status").await?;
        let mut worlds = status::parse(&result.output);
        if !result.success() {
            if worlds.is_empty() {
                tracing::error!(
                    exit_code = result.exit_code,
                    errors = ?result.errors,
                    "mscs status failed with nothing to parse"
                );
                return Err(ExecError::Failed {
                    command: "status".to_string(),
                    exit_code: result.exit_code,
                });
            }
            tracing::warn!(
                exit_code = result.exit_code,
                errors = result.errors.len(),
                "mscs status exited non-zero; using what it printed"
            );
        }

        for world in worlds.iter_mut() {
            self.enricher.enrich(world).await;
        }
        tracing::debug!(count = worlds.len(), "parsed world status");
        Ok(Arc::new(worlds))
    }

    pub async fn world(&self, world_id: &str) -> Result<Option<WorldRecord>, ExecError> {
        Ok(self
            .worlds()
            .await?
            .iter()
            .find(|w| w.id == world_id)
            .cloned())
    }

    pub async fn worlds_computed_at(&self) -> Option<DateTime<Utc>> {
        self.worlds.computed_at(&QueryKey::Worlds).await
    }

    /// Online players plus everyone on the world's whitelist or banlist.
    pub async fn players(&self, world_id: &str) -> Result<Option<Arc<Vec<Player>>>, ExecError> {
        let Some(world) = self.world(world_id).await? else {
            return Ok(None);
        };
        let roster = self
            .rosters
            .get_or_compute(QueryKey::Players(world.id.clone()), || async {
                Ok::<_, ExecError>(Arc::new(self.build_roster(&world).await))
            })
            .await?;
        Ok(Some(roster))
    }

    async fn build_roster(&self, world: &WorldRecord) -> Vec<Player> {
        let (whitelist, banlist) = tokio::join!(
            self.enricher.whitelist(&world.id),
            self.enricher.banlist(&world.id)
        );
        roster(&world.players, &whitelist, &banlist)
    }

    /// Raw `mscs status` output for every world.
    pub async fn servers_status(&self) -> Result<Arc<CommandResult>, ExecError> {
        self.status
            .get_or_compute(QueryKey::ServersStatus, || async {
                self.executor.execute("", "status").await.map(Arc::new)
            })
            .await
    }

    pub async fn list_servers(&self) -> Result<CommandResult, ExecError> {
        self.executor.execute("", "list").await
    }

    pub async fn start(&self, server: &str) -> Result<CommandResult, ExecError> {
        self.executor.execute(server, "start").await
    }

    pub async fn stop(&self, server: &str) -> Result<CommandResult, ExecError> {
        self.executor.execute(server, "stop").await
    }

    pub async fn restart(&self, server: &str) -> Result<CommandResult, ExecError> {
        self.executor.execute(server, "restart").await
    }

    pub async fn backup(&self, server: &str) -> Result<CommandResult, ExecError> {
        self.executor.execute(server, "backup").await
    }

    pub async fn connected_players(&self, server: &str) -> Result<CommandResult, ExecError> {
        self.executor.execute(server, "connected").await
    }

    pub async fn run_command(&self, server: &str, command: &str) -> Result<CommandResult, ExecError> {
        self.executor.execute(server, command).await
    }

    /// Clears every cached answer. Returns how many entries were dropped.
    pub async fn evict_all(&self) -> usize {
        let (a, b, c) = tokio::join!(
            self.worlds.evict_all(),
            self.status.evict_all(),
            self.rosters.evict_all()
        );
        a + b + c
    }
}

fn roster(online: &[String], whitelist: &BTreeSet<String>, banlist: &BTreeSet<String>) -> Vec<Player> {
    let online_set: BTreeSet<&str> = online.iter().map(String::as_str).collect();

    let mut names: Vec<&str> = Vec::new();
    let mut seen = BTreeSet::<&str>::new();
    let offline = whitelist.iter().chain(banlist.iter()).map(String::as_str);
    for name in online.iter().map(String::as_str).chain(offline) {
        if seen.insert(name) {
            names.push(name);
        }
    }

    names
        .into_iter()
        .map(|name| Player {
            username: name.to_string(),
            is_online: online_set.contains(name),
            is_whitelisted: whitelist.contains(name),
            is_blacklisted: banlist.contains(name),
        })
        .collect()
}
