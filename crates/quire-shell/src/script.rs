use std::fmt;

use bson::{Bson, Document};
use quire_db::{Database, DatabaseConfig, DbError};
use quire_store::MemoryStore;
use serde::Deserialize;

#[derive(Debug)]
pub enum ScriptError {
    Json(serde_json::Error),
    /// A command entry is not a document in extended JSON.
    Command { index: usize, message: String },
    Db(DbError),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Json(e) => write!(f, "invalid script: {e}"),
            ScriptError::Command { index, message } => write!(f, "command {index}: {message}"),
            ScriptError::Db(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<serde_json::Error> for ScriptError {
    fn from(e: serde_json::Error) -> Self {
        ScriptError::Json(e)
    }
}

impl From<DbError> for ScriptError {
    fn from(e: DbError) -> Self {
        ScriptError::Db(e)
    }
}

/// Either a bare list of commands or `{config, commands}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScript {
    Commands(Vec<serde_json::Value>),
    Full {
        #[serde(default)]
        config: Option<DatabaseConfig>,
        commands: Vec<serde_json::Value>,
    },
}

/// A parsed command script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub config: Option<DatabaseConfig>,
    pub commands: Vec<Document>,
}

impl Script {
    /// Parse a script. Commands are extended JSON, so `{"$oid": ...}` and
    /// `{"$regularExpression": ...}` values come through as BSON types.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let (config, raw) = match serde_json::from_str(text)? {
            RawScript::Commands(commands) => (None, commands),
            RawScript::Full { config, commands } => (config, commands),
        };

        let mut commands = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            match Bson::try_from(value) {
                Ok(Bson::Document(cmd)) => commands.push(cmd),
                Ok(other) => {
                    return Err(ScriptError::Command {
                        index,
                        message: format!("expected an object, got {other}"),
                    });
                }
                Err(e) => {
                    return Err(ScriptError::Command {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(Self { config, commands })
    }
}

/// Override `config` from `QUIRE_MAX_BATCH` and `QUIRE_BYPASS_VALIDATION`
/// as reported by `lookup`. Unparseable values are ignored.
pub fn apply_env(config: &mut DatabaseConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(max) = lookup("QUIRE_MAX_BATCH").and_then(|s| s.parse().ok()) {
        config.max_batch_size = max;
    }
    if let Some(bypass) = lookup("QUIRE_BYPASS_VALIDATION").and_then(|s| parse_flag(&s)) {
        config.bypass_validation = bypass;
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Run every command against a fresh in-memory database and collect the
/// replies.
pub fn run(script: &Script, config: DatabaseConfig) -> Result<Vec<Document>, ScriptError> {
    let db = Database::open(MemoryStore::new(), config)?;
    Ok(script
        .commands
        .iter()
        .map(|cmd| db.run_command(cmd))
        .collect())
}

/// One reply as relaxed extended JSON on a single line.
pub fn render(reply: Document) -> String {
    Bson::Document(reply).into_relaxed_extjson().to_string()
}
