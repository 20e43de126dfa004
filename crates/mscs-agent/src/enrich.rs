use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Component, Path, PathBuf},
};

use mscs_world::WorldRecord;

use crate::properties;

const SERVER_PROPERTIES: &str = "server.properties";
const WHITELIST: &str = "whitelist.json";
const BANLIST: &str = "banned-players.json";

#[derive(Debug, serde::Deserialize)]
struct NamedEntry {
    name: String,
}

/// Reads per-world files under the mscs worlds directory.
///
/// Every read is best-effort: a missing or broken file yields empty data and
/// a warning, never an error for the world listing.
#[derive(Debug, Clone)]
pub struct PropertyEnricher {
    worlds_root: PathBuf,
}

impl PropertyEnricher {
    pub fn new(worlds_root: impl Into<PathBuf>) -> Self {
        Self {
            worlds_root: worlds_root.into(),
        }
    }

    fn world_file(&self, world_id: &str, name: &str) -> Option<PathBuf> {
        let mut comps = Path::new(world_id).components();
        match (comps.next(), comps.next()) {
            (Some(Component::Normal(_)), None) => Some(self.worlds_root.join(world_id).join(name)),
            _ => {
                tracing::warn!(world_id, "refusing to read files for unsafe world id");
                None
            }
        }
    }

    pub async fn properties(&self, world_id: &str) -> BTreeMap<String, String> {
        let Some(path) = self.world_file(world_id, SERVER_PROPERTIES) else {
            return BTreeMap::new();
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => properties::parse(&text),
            Err(e) => {
                tracing::warn!(world_id, path = %path.display(), error = %e, "failed to read world properties");
                BTreeMap::new()
            }
        }
    }

    pub async fn whitelist(&self, world_id: &str) -> BTreeSet<String> {
        self.player_names(world_id, WHITELIST).await
    }

    pub async fn banlist(&self, world_id: &str) -> BTreeSet<String> {
        self.player_names(world_id, BANLIST).await
    }

    async fn player_names(&self, world_id: &str, file: &str) -> BTreeSet<String> {
        let Some(path) = self.world_file(world_id, file) else {
            return BTreeSet::new();
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => extract_names(&text),
            Err(e) => {
                tracing::warn!(world_id, path = %path.display(), error = %e, "failed to read player list");
                BTreeSet::new()
            }
        }
    }

    /// Folds the world's `server.properties` into its live properties.
    ///
    /// Keys the status scanner set stay as scanned; inactive worlds are left
    /// untouched.
    pub async fn enrich(&self, world: &mut WorldRecord) {
        if !world.is_active {
            return;
        }
        for (k, v) in self.properties(&world.id).await {
            world.properties.entry(k).or_insert(v);
        }
    }
}

/// Pulls player names out of a whitelist/banlist file.
///
/// Well-formed JSON goes through serde; anything else falls back to a line
/// scan for `"name": "<value>"` that skips lines without the expected quoting.
pub fn extract_names(text: &str) -> BTreeSet<String> {
    if let Ok(entries) = serde_json::from_str::<Vec<NamedEntry>>(text) {
        return entries.into_iter().map(|e| e.name).collect();
    }

    text.lines()
        .filter_map(|line| {
            let mut parts = line.split('"');
            let _ = parts.next()?;
            if parts.next()? != "name" {
                return None;
            }
            let _ = parts.next()?;
            let name = parts.next()?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_dir(root: &Path, id: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn extract_names_reads_json_arrays() {
        let text = r#"[
  {"uuid": "1", "name": "alice"},
  {"uuid": "2", "name": "bob", "created": "2024-01-01"}
]"#;
        let names = extract_names(text);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["alice", "bob"]);
    }

    #[test]
    fn extract_names_tolerates_broken_json() {
        let text = "[\n  {\n    \"uuid\": \"1\",\n    \"name\": \"alice\"\n  },\n    name: unquoted\n  {\n    \"name\": \"bob\",\n    \"name\"\n";
        let names = extract_names(text);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn missing_files_yield_empty_data() {
        let root = tempfile::tempdir().unwrap();
        let enricher = PropertyEnricher::new(root.path());
        assert!(enricher.properties("ghost").await.is_empty());
        assert!(enricher.whitelist("ghost").await.is_empty());
        assert!(enricher.banlist("ghost").await.is_empty());
    }

    #[tokio::test]
    async fn unsafe_world_ids_are_refused() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(SERVER_PROPERTIES), "secret=1\n").unwrap();
        let enricher = PropertyEnricher::new(root.path().join("worlds"));
        std::fs::create_dir_all(root.path().join("worlds")).unwrap();

        for id in ["..", ".", "", "a/b", "/etc"] {
            assert!(enricher.properties(id).await.is_empty(), "id {id:?}");
        }
    }

    #[tokio::test]
    async fn reads_lists_per_world() {
        let root = tempfile::tempdir().unwrap();
        let dir = world_dir(root.path(), "alpha");
        std::fs::write(dir.join(WHITELIST), r#"[{"uuid":"u1","name":"alice"}]"#).unwrap();
        std::fs::write(
            dir.join(BANLIST),
            r#"[{"uuid":"u2","name":"mallory","reason":"griefing"}]"#,
        )
        .unwrap();

        let enricher = PropertyEnricher::new(root.path());
        assert!(enricher.whitelist("alpha").await.contains("alice"));
        assert!(enricher.banlist("alpha").await.contains("mallory"));
    }

    #[tokio::test]
    async fn enrich_keeps_scanned_keys() {
        let root = tempfile::tempdir().unwrap();
        let dir = world_dir(root.path(), "alpha");
        std::fs::write(
            dir.join(SERVER_PROPERTIES),
            "motd=Hi\nport=1\nversion=0.0.1\nserver-port=25565\n",
        )
        .unwrap();
        let enricher = PropertyEnricher::new(root.path());

        let mut world = WorldRecord::inactive("alpha");
        world.is_active = true;
        world.properties.insert("version".to_string(), "1.20.1".to_string());
        world.properties.insert("port".to_string(), "25570".to_string());
        enricher.enrich(&mut world).await;

        assert_eq!(world.properties["version"], "1.20.1");
        assert_eq!(world.properties["port"], "25570");
        assert_eq!(world.properties["motd"], "Hi");
        assert_eq!(world.properties["server-port"], "25565");
    }

    #[tokio::test]
    async fn enrich_fills_parser_keys_the_scan_did_not_set() {
        let root = tempfile::tempdir().unwrap();
        let dir = world_dir(root.path(), "alpha");
        std::fs::write(dir.join(SERVER_PROPERTIES), "pid=from-file\n").unwrap();
        let enricher = PropertyEnricher::new(root.path());

        let mut world = WorldRecord::inactive("alpha");
        world.is_active = true;
        enricher.enrich(&mut world).await;
        assert_eq!(world.properties["pid"], "from-file");
    }

    #[tokio::test]
    async fn inactive_worlds_are_not_enriched() {
        let root = tempfile::tempdir().unwrap();
        let dir = world_dir(root.path(), "alpha");
        std::fs::write(dir.join(SERVER_PROPERTIES), "motd=Hi\n").unwrap();
        let enricher = PropertyEnricher::new(root.path());

        let mut world = WorldRecord::inactive("alpha");
        enricher.enrich(&mut world).await;
        assert!(world.properties.is_empty());
    }
}
