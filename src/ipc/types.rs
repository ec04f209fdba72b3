use std::path::PathBuf;

use crate::model::Gradebook;
use rusqlite::Connection;
use serde::Deserialize;

/// One line of stdin.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The selected workspace, its open database and the gradebook loaded from
/// it. `gradebook` always mirrors what was last saved through `db`.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub gradebook: Gradebook,
}

impl AppState {
    /// Closes the database and forgets the workspace.
    pub fn close_workspace(&mut self) {
        self.db = None;
        self.workspace = None;
        self.gradebook = Gradebook::default();
    }

    pub fn install(&mut self, workspace: PathBuf, conn: Connection, gradebook: Gradebook) {
        self.workspace = Some(workspace);
        self.db = Some(conn);
        self.gradebook = gradebook;
    }
}
