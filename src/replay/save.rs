//! Rebuild a saved game's history against the current bundle.

use super::{HistoryItem, InitialStateHistoryItem, ReplayEngine, ReplayError, SaveStateData};

/// Replays the moves recorded in `save` and returns a copy whose states
/// come from the bundle as it is now. Setup and moves are kept as they were.
pub fn reprocess_save_state(
    engine: &ReplayEngine,
    save: &SaveStateData,
) -> Result<SaveStateData, ReplayError> {
    let moves = save.moves();
    let response = engine.reprocess(&save.setup(), &moves)?;

    if response.updates.len() != moves.len() {
        return Err(ReplayError::Protocol(format!(
            "bundle returned {} states for {} moves",
            response.updates.len(),
            moves.len()
        )));
    }

    let history = response
        .updates
        .into_iter()
        .zip(moves)
        .enumerate()
        .map(|(seq, (state, mv))| HistoryItem {
            seq,
            state,
            data: mv.data,
            position: mv.position,
        })
        .collect();

    Ok(SaveStateData {
        random_seed: save.random_seed.clone(),
        settings: save.settings.clone(),
        players: save.players.clone(),
        history,
        initial_state: InitialStateHistoryItem {
            state: response.initial_state,
            players: save.players.clone(),
            settings: save.settings.clone(),
        },
    })
}
