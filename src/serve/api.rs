//! Request routing for the replay and save-state endpoints.
//!
//! | Method | Path             | Success                                  |
//! |--------|------------------|------------------------------------------|
//! | POST   | `/reprocess`     | 200, the save state re-derived           |
//! | GET    | `/states`        | 200, `{entries: [{name, ctime}]}`        |
//! | GET    | `/states/{name}` | 200, the stored state re-derived         |
//! | POST   | `/states/{name}` | 201, body stored as-is                   |
//! | DELETE | `/states/{name}` | 204                                      |
//!
//! Replay timeouts map to 504, errors raised by game code to 422, anything
//! else to 500. Bad names and bodies are 400.

use tiny_http::Method;

use super::response::ApiResponse;
use super::states::{SaveStateListing, SaveStateStore, decode_name};
use crate::log;
use crate::replay::{ReplayEngine, ReplayError, SaveStateData, reprocess_save_state};

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Reprocess,
    States,
    State(&'a str),
}

impl<'a> Route<'a> {
    fn parse(url: &'a str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        match path.trim_end_matches('/') {
            "/reprocess" => Some(Self::Reprocess),
            "/states" => Some(Self::States),
            other => other
                .strip_prefix("/states/")
                .filter(|raw| !raw.contains('/'))
                .map(Self::State),
        }
    }
}

/// Everything a request handler needs.
pub struct Api {
    engine: ReplayEngine,
    states: SaveStateStore,
}

impl Api {
    pub fn new(engine: ReplayEngine, states: SaveStateStore) -> Self {
        Self { engine, states }
    }

    pub fn handle(&self, method: &Method, url: &str, body: &[u8]) -> ApiResponse {
        let Some(route) = Route::parse(url) else {
            return ApiResponse::error(404, "not found");
        };

        match (route, method) {
            (Route::Reprocess, Method::Post) => self.reprocess(body),
            (Route::States, Method::Get) => self.list(),
            (Route::State(raw), method) => {
                let name = match decode_name(raw) {
                    Ok(name) => name,
                    Err(message) => return ApiResponse::error(400, &message),
                };
                match method {
                    Method::Get => self.load(&name),
                    Method::Post => self.store(&name, body),
                    Method::Delete => self.remove(&name),
                    _ => ApiResponse::error(405, "method not allowed"),
                }
            }
            _ => ApiResponse::error(405, "method not allowed"),
        }
    }

    fn reprocess(&self, body: &[u8]) -> ApiResponse {
        let save: SaveStateData = match serde_json::from_slice(body) {
            Ok(save) => save,
            Err(e) => return ApiResponse::error(400, &format!("invalid save state: {e}")),
        };
        self.replay(&save)
    }

    fn list(&self) -> ApiResponse {
        match self.states.list() {
            Ok(entries) => ApiResponse::json(200, &SaveStateListing { entries }),
            Err(e) => internal_error(&e),
        }
    }

    fn load(&self, name: &str) -> ApiResponse {
        match self.states.load(name) {
            Ok(Some(save)) => self.replay(&save),
            Ok(None) => ApiResponse::error(404, &format!("no save state named `{name}`")),
            Err(e) => internal_error(&e),
        }
    }

    fn store(&self, name: &str, body: &[u8]) -> ApiResponse {
        match self.states.store(name, body) {
            Ok(()) => ApiResponse::empty(201),
            Err(e) => internal_error(&e),
        }
    }

    fn remove(&self, name: &str) -> ApiResponse {
        match self.states.remove(name) {
            Ok(true) => ApiResponse::empty(204),
            Ok(false) => ApiResponse::error(404, &format!("no save state named `{name}`")),
            Err(e) => internal_error(&e),
        }
    }

    fn replay(&self, save: &SaveStateData) -> ApiResponse {
        match reprocess_save_state(&self.engine, save) {
            Ok(fresh) => ApiResponse::json(200, &fresh),
            Err(e) => {
                log!("replay"; "{}", e);
                ApiResponse::error(replay_status(&e), &e.to_string())
            }
        }
    }
}

fn replay_status(error: &ReplayError) -> u16 {
    match error {
        ReplayError::Timeout(_) => 504,
        ReplayError::Sandbox(_) => 422,
        _ => 500,
    }
}

fn internal_error(error: &anyhow::Error) -> ApiResponse {
    log!("serve"; "{:#}", error);
    ApiResponse::error(500, &format!("{error:#}"))
}
