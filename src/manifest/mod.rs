//! Game manifest: the declarative description of the UI and Game modules.
//!
//! The manifest lives at the game root as `game.v1.json` (preferred) or
//! `game.json`. Module roots, watch paths and outputs are relative:
//!
//! ```text
//! <game root>/
//! ├── game.v1.json
//! ├── ui/            ui.root, build commands run here
//! │   └── dist/      ui.outDir (relative to ui.root)
//! └── game/          game.root
//!     └── dist/index.js   game.out (the replay bundle)
//! ```
//!
//! Watch paths are relative to the game root, not the module root.

mod error;

pub use error::{ManifestDiagnostic, ManifestDiagnostics, ManifestError};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::{BuildMode, Target};
use crate::utils::path::normalize_path;

/// Manifest file names, in lookup order.
pub const MANIFEST_FILES: [&str; 2] = ["game.v1.json", "game.json"];

/// Parsed `game.v1.json`. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub min_players: u32,
    pub max_players: u32,
    /// `0` means unset, like an omitted field.
    #[serde(
        default,
        deserialize_with = "zero_as_unset",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_players: Option<u32>,
    pub ui: ModuleSpec,
    pub game: ModuleSpec,
}

fn zero_as_unset<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<u32>::deserialize(deserializer)?;
    Ok(value.filter(|&n| n != 0))
}

/// One module (UI or Game) of the package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    #[serde(default)]
    pub root: PathBuf,
    #[serde(rename = "build", default)]
    pub build_commands: BuildCommands,
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,
    /// `outDir` for the UI, `out` for the Game.
    #[serde(alias = "outDir", alias = "out", default)]
    pub output: PathBuf,
}

/// Command lines per build mode. Each entry is split on whitespace, no shell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildCommands {
    #[serde(default, deserialize_with = "one_or_many")]
    pub dev: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub prod: Vec<String>,
}

/// Accept `"cmd"` or `["cmd", ...]`; blank entries are dropped.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let commands = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(cmd)) => vec![cmd],
        Some(OneOrMany::Many(cmds)) => cmds,
    };
    Ok(commands
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect())
}

impl Manifest {
    /// Find the manifest file under `game_root`.
    pub fn locate(game_root: &Path) -> Option<PathBuf> {
        MANIFEST_FILES
            .iter()
            .map(|name| game_root.join(name))
            .find(|path| path.is_file())
    }

    /// Locate, parse and validate the manifest.
    pub fn load(game_root: &Path) -> Result<Self, ManifestError> {
        let path = Self::locate(game_root)
            .ok_or_else(|| ManifestError::NotFound(game_root.to_path_buf()))?;
        let content =
            fs::read_to_string(&path).map_err(|e| ManifestError::Io(path.clone(), e))?;
        let manifest = Self::from_json(&content).map_err(|e| match e {
            ParseError::Json(err) => ManifestError::Json(path.clone(), err),
            ParseError::Invalid(diagnostics) => ManifestError::Validation(diagnostics),
        })?;
        crate::debug!("manifest"; "loaded {}", path.display());
        Ok(manifest)
    }

    fn from_json(content: &str) -> Result<Self, ParseError> {
        let manifest: Self = serde_json::from_str(content).map_err(ParseError::Json)?;
        manifest.validate().map_err(ParseError::Invalid)?;
        Ok(manifest)
    }

    /// Check player counts and module roots.
    pub fn validate(&self) -> Result<(), ManifestDiagnostics> {
        let mut diagnostics = ManifestDiagnostics::default();

        if self.min_players < 1 {
            diagnostics.push("minPlayers", "must be at least 1");
        }
        if self.max_players < self.min_players {
            diagnostics.push(
                "maxPlayers",
                format!(
                    "{} is less than minPlayers ({})",
                    self.max_players, self.min_players
                ),
            );
        }
        if let Some(default) = self.default_players
            && !(self.min_players..=self.max_players).contains(&default)
        {
            diagnostics.push(
                "defaultPlayers",
                format!(
                    "{default} is outside {}..={}",
                    self.min_players, self.max_players
                ),
            );
        }
        if self.ui.root.as_os_str().is_empty() {
            diagnostics.push("ui.root", "must not be empty");
        }
        if self.game.root.as_os_str().is_empty() {
            diagnostics.push("game.root", "must not be empty");
        }

        if diagnostics.is_empty() {
            Ok(())
        } else {
            Err(diagnostics)
        }
    }

    /// Player count preselected for a new game.
    pub fn default_players(&self) -> u32 {
        self.default_players.unwrap_or(self.min_players)
    }

    pub fn module(&self, target: Target) -> &ModuleSpec {
        match target {
            Target::Ui => &self.ui,
            Target::Game => &self.game,
        }
    }

    /// Absolute watch paths of `target`, resolved against the game root.
    pub fn watch_paths(&self, target: Target, game_root: &Path) -> Vec<PathBuf> {
        self.module(target)
            .watch_paths
            .iter()
            .map(|p| normalize_path(&game_root.join(p)))
            .collect()
    }

    /// The compiled Game bundle used by replay.
    pub fn bundle_path(&self, game_root: &Path) -> PathBuf {
        self.game.output_path(game_root)
    }
}

impl ModuleSpec {
    /// Working directory for this module's build commands.
    pub fn root_dir(&self, game_root: &Path) -> PathBuf {
        game_root.join(&self.root)
    }

    /// Output file or directory, relative to the module root.
    pub fn output_path(&self, game_root: &Path) -> PathBuf {
        self.root_dir(game_root).join(&self.output)
    }

    pub fn commands(&self, mode: BuildMode) -> &[String] {
        match mode {
            BuildMode::Dev => &self.build_commands.dev,
            BuildMode::Prod => &self.build_commands.prod,
        }
    }
}

enum ParseError {
    Json(serde_json::Error),
    Invalid(ManifestDiagnostics),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "minPlayers": 2,
        "maxPlayers": 4,
        "ui": {
            "root": "ui",
            "build": { "dev": "npm run dev", "prod": ["npm run build", "npm run lint"] },
            "watchPaths": ["ui/src"],
            "outDir": "dist"
        },
        "game": {
            "root": "game",
            "build": { "dev": "npm run dev", "prod": "npm run build" },
            "watchPaths": ["game/src", "game/package.json"],
            "out": "dist/index.js"
        }
    }"#;

    fn parse(content: &str) -> Manifest {
        match Manifest::from_json(content) {
            Ok(m) => m,
            Err(ParseError::Json(e)) => panic!("json: {e}"),
            Err(ParseError::Invalid(d)) => panic!("invalid: {d}"),
        }
    }

    fn invalid_fields(content: &str) -> Vec<&'static str> {
        match Manifest::from_json(content) {
            Err(ParseError::Invalid(d)) => d.iter().map(|d| d.field).collect(),
            _ => panic!("expected validation failure"),
        }
    }

    #[test]
    fn test_parse_sample() {
        let manifest = parse(SAMPLE);
        assert_eq!(manifest.min_players, 2);
        assert_eq!(manifest.default_players(), 2);
        assert_eq!(manifest.ui.commands(BuildMode::Dev), ["npm run dev"]);
        assert_eq!(
            manifest.ui.commands(BuildMode::Prod),
            ["npm run build", "npm run lint"]
        );
        assert_eq!(manifest.ui.output, PathBuf::from("dist"));
        assert_eq!(manifest.game.output, PathBuf::from("dist/index.js"));
        assert_eq!(manifest.game.watch_paths.len(), 2);
    }

    #[test]
    fn test_paths_resolve_against_roots() {
        let manifest = parse(SAMPLE);
        let root = Path::new("/games/demo");
        assert_eq!(manifest.ui.root_dir(root), PathBuf::from("/games/demo/ui"));
        assert_eq!(
            manifest.bundle_path(root),
            PathBuf::from("/games/demo/game/dist/index.js")
        );
        assert_eq!(
            manifest.watch_paths(Target::Ui, root),
            vec![PathBuf::from("/games/demo/ui/src")]
        );
    }

    #[test]
    fn test_output_alias_and_missing_commands() {
        let manifest = parse(
            r#"{"minPlayers":1,"maxPlayers":1,"defaultPlayers":1,
                "ui":{"root":"ui","output":"build"},
                "game":{"root":"game","build":{"dev":"  "},"output":"game.js"}}"#,
        );
        assert_eq!(manifest.ui.output, PathBuf::from("build"));
        assert!(manifest.ui.commands(BuildMode::Dev).is_empty());
        assert!(manifest.game.commands(BuildMode::Dev).is_empty());
    }

    #[test]
    fn test_zero_default_players_falls_back_to_min() {
        let manifest = parse(
            r#"{"minPlayers":2,"maxPlayers":4,"defaultPlayers":0,
                "ui":{"root":"ui"},"game":{"root":"game"}}"#,
        );
        assert_eq!(manifest.default_players, None);
        assert_eq!(manifest.default_players(), 2);
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let fields = invalid_fields(
            r#"{"minPlayers":0,"maxPlayers":3,"defaultPlayers":9,
                "ui":{"root":""},"game":{"root":"game"}}"#,
        );
        assert_eq!(fields, vec!["minPlayers", "defaultPlayers", "ui.root"]);

        let fields = invalid_fields(
            r#"{"minPlayers":3,"maxPlayers":2,"ui":{"root":"ui"},"game":{"root":""}}"#,
        );
        assert_eq!(fields, vec!["maxPlayers", "game.root"]);
    }

    #[test]
    fn test_load_prefers_v1_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("game.json"), "not json").unwrap();
        fs::write(dir.path().join("game.v1.json"), SAMPLE).unwrap();

        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.max_players, 4);
    }

    #[test]
    fn test_load_falls_back_to_game_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("game.json"), SAMPLE).unwrap();
        assert!(Manifest::load(dir.path()).is_ok());
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(ManifestError::NotFound(_))
        ));

        fs::write(dir.path().join("game.v1.json"), "{").unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(ManifestError::Json(..))
        ));
    }
}
