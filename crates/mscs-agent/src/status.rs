//! Scanner for `mscs status` output.
//!
//! The tool prints one block per world, introduced by a boundary line:
//!
//! ```text
//! Minecraft Server Status:
//! alpha: running version 1.20.1 ... 3 of 10 users
//! Players: alice, bob.
//! Port: 25565.
//! Memory used: 1024 MB.
//! Process ID: 4242.
//! beta: not running
//! ```
//!
//! There is no escaping or formal grammar; lines that don't fit are skipped
//! and the scan carries on.

use std::{
    collections::{BTreeMap, HashSet},
    sync::LazyLock,
};

use mscs_world::WorldRecord;
use regex::Regex;

const HEADER: &str = "Minecraft Server Status:";

const KEY_VERSION: &str = "version";
const KEY_MAX_PLAYERS: &str = "maxPlayers";
const KEY_PORT: &str = "port";
const KEY_MEMORY_USED: &str = "memoryUsed";
const KEY_PID: &str = "pid";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"version (\d+\.\d+\.\d+).*?(\d+) of (\d+) users").expect("valid version regex")
});

static PLAYERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Players: ([^.]+)\.").expect("valid players regex"));

const DETAIL_PREFIXES: [(&str, &str); 3] = [
    ("Port:", KEY_PORT),
    ("Memory used:", KEY_MEMORY_USED),
    ("Process ID:", KEY_PID),
];

/// In-progress world; frozen into a [`WorldRecord`] at the next boundary.
#[derive(Debug)]
struct WorldBuilder {
    id: String,
    is_active: bool,
    players: Vec<String>,
    properties: BTreeMap<String, String>,
}

impl WorldBuilder {
    fn inactive(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_active: false,
            players: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    fn running(id: &str, version: &str, max_players: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(KEY_VERSION.to_string(), version.to_string());
        properties.insert(KEY_MAX_PLAYERS.to_string(), max_players.to_string());
        Self {
            id: id.to_string(),
            is_active: true,
            players: Vec::new(),
            properties,
        }
    }

    fn apply_detail(&mut self, line: &str) {
        // Inactive blocks carry no details worth keeping.
        if !self.is_active {
            return;
        }

        if let Some(caps) = PLAYERS_RE.captures(line) {
            self.players = caps[1]
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            return;
        }

        for (prefix, key) in DETAIL_PREFIXES {
            if line.starts_with(prefix) {
                if let Some((_, rest)) = line.split_once(':') {
                    let value = rest.trim().trim_end_matches('.').trim_end();
                    self.properties.insert(key.to_string(), value.to_string());
                }
                return;
            }
        }
    }

    fn finish(self) -> WorldRecord {
        WorldRecord {
            display_name: self.id.clone(),
            id: self.id,
            is_active: self.is_active,
            players: self.players,
            properties: self.properties,
        }
    }
}

enum Boundary<'a> {
    NotRunning(&'a str),
    Running {
        id: &'a str,
        version: &'a str,
        max_players: &'a str,
    },
    /// Looked like a boundary but the id or version text didn't parse.
    Malformed,
}

fn classify(line: &str) -> Option<Boundary<'_>> {
    if !line.contains("running version") && !line.contains("not running") {
        return None;
    }

    let Some((id, status)) = line.split_once(':') else {
        return Some(Boundary::Malformed);
    };
    let id = id.trim();
    let status = status.trim();
    if id.is_empty() {
        return Some(Boundary::Malformed);
    }

    if status.starts_with("not running") {
        return Some(Boundary::NotRunning(id));
    }

    match VERSION_RE.captures(status) {
        Some(caps) => {
            let (Some(version), Some(max_players)) = (caps.get(1), caps.get(3)) else {
                return Some(Boundary::Malformed);
            };
            Some(Boundary::Running {
                id,
                version: version.as_str(),
                max_players: max_players.as_str(),
            })
        }
        None => Some(Boundary::Malformed),
    }
}

/// Turns `mscs status` output into one record per world, in order of first
/// appearance.
///
/// Pure: no I/O, and the same lines always produce the same records. A world
/// id that shows up a second time is ignored along with its detail lines.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Vec<WorldRecord> {
    let mut worlds = Vec::new();
    let mut seen = HashSet::<String>::new();
    let mut current: Option<WorldBuilder> = None;

    for raw in lines {
        let line = raw.as_ref().trim();
        if line.is_empty() || line == HEADER {
            continue;
        }

        let Some(boundary) = classify(line) else {
            if let Some(world) = current.as_mut() {
                world.apply_detail(line);
            }
            continue;
        };

        if let Some(world) = current.take() {
            worlds.push(world.finish());
        }

        current = match boundary {
            Boundary::NotRunning(id) if !seen.contains(id) => Some(WorldBuilder::inactive(id)),
            Boundary::Running {
                id,
                version,
                max_players,
            } if !seen.contains(id) => Some(WorldBuilder::running(id, version, max_players)),
            Boundary::NotRunning(id) | Boundary::Running { id, .. } => {
                tracing::debug!(world_id = id, "duplicate world in status output; skipped");
                None
            }
            Boundary::Malformed => {
                tracing::debug!(line, "unparseable status boundary line; skipped");
                None
            }
        };
        if let Some(world) = current.as_ref() {
            seen.insert(world.id.clone());
        }
    }

    if let Some(world) = current.take() {
        worlds.push(world.finish());
    }

    worlds
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Renders records back into the shape `mscs status` prints.
    pub(crate) fn render(worlds: &[WorldRecord]) -> Vec<String> {
        let mut out = vec![HEADER.to_string()];
        for w in worlds {
            if !w.is_active {
                out.push(format!("{}: not running", w.id));
                continue;
            }
            let version = w.properties.get(KEY_VERSION).cloned().unwrap_or_default();
            let max = w.properties.get(KEY_MAX_PLAYERS).cloned().unwrap_or_default();
            out.push(format!(
                "{}: running version {version} of Minecraft with {} of {max} users online.",
                w.id,
                w.players.len()
            ));
            if !w.players.is_empty() {
                out.push(format!("Players: {}.", w.players.join(", ")));
            }
            for (prefix, key) in DETAIL_PREFIXES {
                if let Some(v) = w.properties.get(key) {
                    out.push(format!("{prefix} {v}."));
                }
            }
        }
        out
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn not_running_world_is_inactive_and_bare() {
        let worlds = parse(&["worldA: not running"]);
        assert_eq!(worlds, vec![WorldRecord::inactive("worldA")]);
    }

    #[test]
    fn running_world_collects_players_and_properties() {
        let input = lines(
            "worldA: running version 1.20.1 ... 3 of 10 users\nPlayers: alice, bob.\nPort: 25565.\n",
        );
        let worlds = parse(&input);
        assert_eq!(worlds.len(), 1);

        let w = &worlds[0];
        assert_eq!(w.id, "worldA");
        assert_eq!(w.display_name, "worldA");
        assert!(w.is_active);
        assert_eq!(w.players, vec!["alice", "bob"]);
        assert_eq!(w.properties.get("version").map(String::as_str), Some("1.20.1"));
        assert_eq!(w.properties.get("maxPlayers").map(String::as_str), Some("10"));
        assert_eq!(w.properties.get("port").map(String::as_str), Some("25565"));
    }

    #[test]
    fn two_worlds_keep_input_order() {
        let input = lines(
            "Minecraft Server Status:\n\
             zeta: running version 1.19.4 of Minecraft with 0 of 20 users online.\n\
             Port: 25570.\n\
             \n\
             alpha: not running\n",
        );
        let worlds = parse(&input);
        let ids: Vec<&str> = worlds.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert!(worlds[0].is_active);
        assert!(!worlds[1].is_active);
    }

    #[test]
    fn detail_values_keep_inner_text_and_drop_trailing_periods() {
        let input = lines(
            "  alpha: running version 1.20.4 of Minecraft with 1 of 8 users online.  \n\
             \tMemory used: 1.5 GB (12.3%)...\n\
             Process ID: 4242.\n\
             Port:25565\n",
        );
        let w = &parse(&input)[0];
        assert_eq!(w.properties["memoryUsed"], "1.5 GB (12.3%)");
        assert_eq!(w.properties["pid"], "4242");
        assert_eq!(w.properties["port"], "25565");
    }

    #[test]
    fn malformed_version_starts_no_world() {
        let input = lines(
            "alpha: running version unknown\n\
             Players: ghost.\n\
             Port: 1.\n\
             beta: not running\n",
        );
        let worlds = parse(&input);
        assert_eq!(worlds, vec![WorldRecord::inactive("beta")]);
    }

    #[test]
    fn malformed_boundary_finalizes_previous_world() {
        let input = lines(
            "alpha: running version 1.20.1 with 0 of 5 users\n\
             no colon but not running here\n\
             Port: 9999.\n",
        );
        let worlds = parse(&input);
        assert_eq!(worlds.len(), 1);
        assert!(!worlds[0].properties.contains_key("port"));
    }

    #[test]
    fn duplicate_world_ids_keep_the_first_block() {
        let input = lines(
            "alpha: running version 1.20.1 with 1 of 5 users\n\
             Port: 1000.\n\
             alpha: running version 1.20.2 with 0 of 9 users\n\
             Port: 2000.\n",
        );
        let worlds = parse(&input);
        assert_eq!(worlds.len(), 1);
        assert_eq!(worlds[0].properties["version"], "1.20.1");
        assert_eq!(worlds[0].properties["port"], "1000");
    }

    #[test]
    fn detail_lines_without_a_world_are_ignored() {
        let input = lines("Players: alice.\nPort: 1.\nsomething else\n");
        assert!(parse(&input).is_empty());
    }

    #[test]
    fn inactive_world_ignores_details() {
        let input = lines("alpha: not running\nPlayers: alice.\nPort: 1.\n");
        assert_eq!(parse(&input), vec![WorldRecord::inactive("alpha")]);
    }

    #[test]
    fn later_players_line_replaces_earlier() {
        let input = lines(
            "alpha: running version 1.20.1 with 2 of 5 users\n\
             Players: alice, bob.\n\
             Players: carol.\n",
        );
        assert_eq!(parse(&input)[0].players, vec!["carol"]);
    }

    #[test]
    fn world_count_matches_parseable_boundaries() {
        let input = lines(
            "a: not running\n\
             b: running version 1.2.3 with 0 of 1 users\n\
             c: running version broken\n\
             d: running version 1.2.3 with 0 of 2 users\n\
             e: not running\n",
        );
        assert_eq!(parse(&input).len(), 4);
    }

    #[test]
    fn parse_is_deterministic() {
        let input = lines(
            "Minecraft Server Status:\n\
             alpha: running version 1.20.1 with 2 of 5 users\n\
             Players: alice, bob.\n\
             beta: not running\n",
        );
        assert_eq!(parse(&input), parse(&input));
    }

    #[test]
    fn reparsing_rendered_output_is_stable() {
        let input = lines(
            "Minecraft Server Status:\n\
             alpha: running version 1.20.1 with 2 of 5 users\n\
             Players: alice, bob.\n\
             Port: 25565.\n\
             Memory used: 2048 MB.\n\
             Process ID: 77.\n\
             beta: not running\n\
             gamma: running version 1.18.2 with 0 of 3 users\n",
        );
        let first = parse(&input);
        let second = parse(&render(&first));
        assert_eq!(first, second);
    }
}
