// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub const DEFAULT_KEY_PREFIX: &str = "game:";
pub const GAME_NOT_FOUND: &str = "Game not found";

pub type GameId = String;

/// A game record as stored and as returned over HTTP.
///
/// Every field defaults to its zero value so partial payloads decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Game {
    pub game_id: GameId,
    pub game: String,
    pub description: String,
    pub status: String,
    /// RFC3339 timestamp assigned when the record is created.
    pub created: String,
    pub deleted: bool,
}

/// Update payload. Decodes the full record shape so mistyped fields are
/// rejected, but only `game`, `description` and `status` are ever merged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GamePatch {
    pub game_id: Option<GameId>,
    pub game: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub created: Option<String>,
    pub deleted: Option<bool>,
}

impl Game {
    /// Stamps a freshly submitted record: sets `created` and clears `deleted`
    /// whatever the client sent for them.
    pub fn into_created(mut self, now: DateTime<Utc>) -> Self {
        self.created = format_timestamp(now);
        self.deleted = false;
        self
    }

    /// Merges the non-empty fields of `patch` into this record.
    pub fn apply_patch(&mut self, patch: &GamePatch) {
        merge_field(&mut self.game, patch.game.as_deref());
        merge_field(&mut self.description, patch.description.as_deref());
        merge_field(&mut self.status, patch.status.as_deref());
    }

    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn is_listed(&self) -> bool {
        !self.deleted
    }
}

// Empty strings count as "not supplied".
fn supplied(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

fn merge_field(target: &mut String, value: Option<&str>) {
    if let Some(value) = supplied(value) {
        *target = value.to_string();
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn encode_game(game: &Game) -> serde_json::Result<String> {
    serde_json::to_string(game)
}

/// Decodes a create payload. A JSON `null` body yields an all-default record.
pub fn decode_game_payload(body: &[u8]) -> serde_json::Result<Game> {
    decode_first_value(body)
}

/// Decodes an update payload. A JSON `null` body yields an empty patch.
pub fn decode_patch_payload(body: &[u8]) -> serde_json::Result<GamePatch> {
    decode_first_value(body)
}

// Reads the leading JSON value only; anything after it is left unread.
fn decode_first_value<T>(body: &[u8]) -> serde_json::Result<T>
where
    T: DeserializeOwned + Default,
{
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    Option::<T>::deserialize(&mut deserializer).map(Option::unwrap_or_default)
}

/// Decodes a value read back from the store.
pub fn decode_stored_game(raw: &str) -> serde_json::Result<Game> {
    serde_json::from_str(raw)
}

/// Store key for a game id under the given namespace prefix.
pub fn store_key(prefix: &str, game_id: &str) -> String {
    format!("{prefix}{game_id}")
}

/// Glob pattern matching every key in the namespace. Glob metacharacters in
/// the prefix are escaped so only the trailing `*` is a wildcard.
pub fn key_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}

pub fn game_id_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
