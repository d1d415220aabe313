//! Replay data model, in the JSON shape the game bundle and saved games use.
//!
//! Game-defined payloads (`data`, `state`, `settings`) are opaque
//! `serde_json::Value`s; with `preserve_order` they re-serialize with their
//! keys in the original order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One player action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub position: i64,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Player {
    pub id: String,
    pub color: String,
    pub name: String,
    pub position: i64,
    pub avatar: String,
    pub host: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

/// Deterministic inputs of one game instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupState {
    pub random_seed: String,
    pub players: Vec<Player>,
    pub settings: Value,
}

/// What `game.reprocessHistory` returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessResponse {
    #[serde(default)]
    pub initial_state: Value,
    #[serde(default)]
    pub updates: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State after move `seq`, next to the move that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub seq: usize,
    pub state: Value,
    pub data: Value,
    pub position: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialStateHistoryItem {
    pub state: Value,
    pub players: Vec<Player>,
    pub settings: Value,
}

/// A saved game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveStateData {
    pub random_seed: String,
    pub settings: Value,
    pub players: Vec<Player>,
    pub history: Vec<HistoryItem>,
    pub initial_state: InitialStateHistoryItem,
}

impl SaveStateData {
    pub fn setup(&self) -> SetupState {
        SetupState {
            random_seed: self.random_seed.clone(),
            players: self.players.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Moves recorded in `history`, in order.
    pub fn moves(&self) -> Vec<Move> {
        self.history
            .iter()
            .map(|item| Move {
                position: item.position,
                data: item.data.clone(),
            })
            .collect()
    }
}
