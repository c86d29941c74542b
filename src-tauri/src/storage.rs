use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::ConnectionProfile;

const FILE_NAME: &str = "connections.json";
const SESSION_FILE_NAME: &str = "session.json";

fn file_in(dir: &Path, name: &str) -> DbResult<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(name))
}

pub fn load_connections(dir: &Path) -> DbResult<Vec<ConnectionProfile>> {
    let path = file_in(dir, FILE_NAME)?;
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_connections(dir: &Path, connections: &[ConnectionProfile]) -> DbResult<()> {
    let path = file_in(dir, FILE_NAME)?;
    fs::write(path, serde_json::to_string_pretty(connections)?)?;
    Ok(())
}

/// Insert or replace by id. A profile without an id gets a fresh one, which is returned.
pub fn add_connection(dir: &Path, mut connection: ConnectionProfile) -> DbResult<String> {
    if connection.id.trim().is_empty() {
        connection.id = Uuid::new_v4().to_string();
    }
    let id = connection.id.clone();

    let mut connections = load_connections(dir)?;
    match connections.iter().position(|c| c.id == connection.id) {
        Some(pos) => connections[pos] = connection,
        None => connections.push(connection),
    }
    save_connections(dir, &connections)?;
    Ok(id)
}

pub fn delete_connection(dir: &Path, id: &str) -> DbResult<()> {
    let mut connections = load_connections(dir)?;
    connections.retain(|c| c.id != id);
    save_connections(dir, &connections)
}

/// UI state restored on the next launch.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Session {
    pub last_profile_id: Option<String>,
    pub last_table: Option<String>,
    pub active_tab: Option<String>,
    pub notification_email: Option<String>,
}

/// A missing or unreadable session file yields the default session.
pub fn load_session(dir: &Path) -> DbResult<Session> {
    let path = file_in(dir, SESSION_FILE_NAME)?;
    if !path.exists() {
        return Ok(Session::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

pub fn save_session(dir: &Path, session: &Session) -> DbResult<()> {
    let path = file_in(dir, SESSION_FILE_NAME)?;
    fs::write(path, serde_json::to_string_pretty(session)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(id: &str, name: &str) -> ConnectionProfile {
        ConnectionProfile {
            id: id.to_string(),
            name: name.to_string(),
            server: "localhost\\SQLEXPRESS".to_string(),
            database: "NEO_Monitoring".to_string(),
            username: None,
            port: None,
        }
    }

    #[test]
    fn profiles_are_added_replaced_and_deleted() {
        let dir = TempDir::new().unwrap();
        assert!(load_connections(dir.path()).unwrap().is_empty());

        let id = add_connection(dir.path(), profile("", "local")).unwrap();
        assert!(!id.is_empty());
        add_connection(dir.path(), profile(&id, "renamed")).unwrap();
        add_connection(dir.path(), profile("other", "lab")).unwrap();

        let saved = load_connections(dir.path()).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].name, "renamed");

        delete_connection(dir.path(), &id).unwrap();
        assert_eq!(load_connections(dir.path()).unwrap(), vec![profile("other", "lab")]);
    }

    #[test]
    fn corrupt_session_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SESSION_FILE_NAME), "{not json").unwrap();
        assert_eq!(load_session(dir.path()).unwrap(), Session::default());

        let session = Session {
            last_table: Some("Asteroid".to_string()),
            ..Session::default()
        };
        save_session(dir.path(), &session).unwrap();
        assert_eq!(load_session(dir.path()).unwrap(), session);
    }

    #[test]
    fn corrupt_profiles_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FILE_NAME), "[{").unwrap();
        assert!(load_connections(dir.path()).is_err());
    }
}
