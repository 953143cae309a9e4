//! Lineup data model.
//!
//! An [`Act`] is decoded from a store document whose body has the shape
//! `{artist, genre, desc, day, ratings: [{name, like, notes, rowdy}]}`. The
//! store-assigned document id becomes the act's identity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::document_store::{Document, DocumentId};

/// Highest value of either score.
pub const MAX_SCORE: u8 = 5;

/// Errors raised by the lineup model and the sync core before any I/O.
#[derive(Debug, Error, PartialEq)]
pub enum LineupError {
    #[error("Score {0} is out of range (0-{max})", max = MAX_SCORE)]
    ScoreOutOfRange(u8),

    #[error("Unknown act: {0}")]
    UnknownAct(DocumentId),

    #[error("Act {act_id} has no rating by '{reviewer}'")]
    UnknownReviewer { act_id: DocumentId, reviewer: String },

    #[error("Invalid lineup record {id}: {reason}")]
    InvalidRecord { id: DocumentId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 4] = [Day::Thursday, Day::Friday, Day::Saturday, Day::Sunday];

    /// The three main festival days offered by the day picker.
    pub const FESTIVAL_DAYS: [Day; 3] = [Day::Friday, Day::Saturday, Day::Sunday];

    pub fn as_str(&self) -> &'static str {
        match self {
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }

    /// Case-insensitive parse of a day name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reviewer's assessment of one act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Reviewer identity.
    pub name: String,
    /// Enjoyment score, `None` until rated.
    #[serde(default, deserialize_with = "lenient_score")]
    pub like: Option<u8>,
    #[serde(default)]
    pub notes: String,
    /// Energy score, `None` until rated.
    #[serde(default, deserialize_with = "lenient_score")]
    pub rowdy: Option<u8>,
}

/// Reads a stored score, treating a value that is not a small non-negative
/// integer as unrated so the act itself still decodes.
fn lenient_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(value) => {
            let score = value.as_u64().and_then(|n| u8::try_from(n).ok());
            if score.is_none() {
                warn!("Ignoring unreadable score {}", value);
            }
            score
        }
    })
}

impl Rating {
    pub fn unrated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            like: None,
            notes: String::new(),
            rowdy: None,
        }
    }

    pub fn score(&self, field: ScoreField) -> Option<u8> {
        match field {
            ScoreField::Like => self.like,
            ScoreField::Rowdy => self.rowdy,
        }
    }

    /// Whether applying `patch` would leave this rating unchanged.
    pub fn already_has(&self, patch: &RatingPatch) -> bool {
        match patch {
            RatingPatch::Score { field, value } => self.score(*field) == Some(*value),
            RatingPatch::Notes(notes) => &self.notes == notes,
        }
    }

    /// Returns a copy of this rating with `patch` applied.
    pub fn patched(&self, patch: &RatingPatch) -> Self {
        let mut rating = self.clone();
        match patch {
            RatingPatch::Score {
                field: ScoreField::Like,
                value,
            } => rating.like = Some(*value),
            RatingPatch::Score {
                field: ScoreField::Rowdy,
                value,
            } => rating.rowdy = Some(*value),
            RatingPatch::Notes(notes) => rating.notes = notes.clone(),
        }
        rating
    }
}

/// One lineup entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Act {
    pub id: DocumentId,
    pub artist: String,
    pub genre: Vec<String>,
    pub desc: String,
    pub day: Day,
    /// At most one entry per reviewer.
    pub ratings: Vec<Arc<Rating>>,
}

/// Document body of an act, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActRecord {
    pub artist: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub desc: String,
    pub day: Day,
    #[serde(default)]
    pub ratings: Vec<Rating>,
}

impl Act {
    /// Decodes an act from a store document. Fields other than the act
    /// attributes (timestamps, legacy ids) are ignored. Duplicate ratings by
    /// the same reviewer are collapsed to the first one.
    pub fn from_document(document: &Document) -> Result<Self, LineupError> {
        let record: ActRecord =
            serde_json::from_value(serde_json::Value::Object(document.fields.clone())).map_err(
                |e| LineupError::InvalidRecord {
                    id: document.id.clone(),
                    reason: e.to_string(),
                },
            )?;

        let mut ratings: Vec<Arc<Rating>> = Vec::with_capacity(record.ratings.len());
        for rating in record.ratings {
            if ratings.iter().any(|r| r.name == rating.name) {
                warn!(
                    "Act {} has a duplicate rating by '{}', keeping the first",
                    document.id, rating.name
                );
                continue;
            }
            ratings.push(Arc::new(rating));
        }

        Ok(Self {
            id: document.id.clone(),
            artist: record.artist,
            genre: record.genre,
            desc: record.desc,
            day: record.day,
            ratings,
        })
    }

    pub fn rating(&self, reviewer: &str) -> Option<&Rating> {
        self.ratings
            .iter()
            .find(|r| r.name == reviewer)
            .map(|r| r.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreField {
    /// Enjoyment.
    Like,
    /// Energy.
    Rowdy,
}

impl ScoreField {
    /// Name of the field inside a stored rating.
    pub fn key(&self) -> &'static str {
        match self {
            ScoreField::Like => "like",
            ScoreField::Rowdy => "rowdy",
        }
    }
}

/// Identifies one field of a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatingField {
    Score(ScoreField),
    Notes,
}

impl RatingField {
    pub fn key(&self) -> &'static str {
        match self {
            RatingField::Score(field) => field.key(),
            RatingField::Notes => "notes",
        }
    }
}

/// A single-field change to one rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatingPatch {
    Score { field: ScoreField, value: u8 },
    Notes(String),
}

impl RatingPatch {
    /// Builds a score patch. A cleared score (`None`) is stored as 0.
    pub fn score(field: ScoreField, value: Option<u8>) -> Result<Self, LineupError> {
        let value = value.unwrap_or(0);
        if value > MAX_SCORE {
            return Err(LineupError::ScoreOutOfRange(value));
        }
        Ok(RatingPatch::Score { field, value })
    }

    pub fn notes(notes: impl Into<String>) -> Self {
        RatingPatch::Notes(notes.into())
    }

    pub fn field(&self) -> RatingField {
        match self {
            RatingPatch::Score { field, .. } => RatingField::Score(*field),
            RatingPatch::Notes(_) => RatingField::Notes,
        }
    }

    /// The patched value as it appears in a stored rating.
    pub fn json_value(&self) -> serde_json::Value {
        match self {
            RatingPatch::Score { value, .. } => serde_json::Value::from(*value),
            RatingPatch::Notes(notes) => serde_json::Value::from(notes.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::Fields;
    use serde_json::json;

    fn document(id: &str, body: serde_json::Value) -> Document {
        let fields: Fields = body.as_object().cloned().unwrap();
        Document::new(id, fields)
    }

    #[test]
    fn test_decode_act_from_document() {
        let doc = document(
            "doc1",
            json!({
                "id": 17,
                "artist": "Example Band",
                "genre": ["folk", "indie"],
                "desc": "A band.",
                "day": "Saturday",
                "ratings": [
                    {"name": "alice", "like": null, "notes": "", "rowdy": null},
                    {"name": "bob", "like": 3, "notes": "loud", "rowdy": 5}
                ],
                "createdAt": "2025-05-01T10:00:00Z"
            }),
        );

        let act = Act::from_document(&doc).unwrap();
        assert_eq!(act.id, "doc1");
        assert_eq!(act.artist, "Example Band");
        assert_eq!(act.day, Day::Saturday);
        assert_eq!(act.genre, vec!["folk", "indie"]);
        assert_eq!(act.rating("alice"), Some(&Rating::unrated("alice")));
        assert_eq!(act.rating("bob").unwrap().rowdy, Some(5));
        assert!(act.rating("carol").is_none());
    }

    #[test]
    fn test_decode_keeps_act_with_unreadable_scores() {
        let doc = document(
            "doc2",
            json!({
                "artist": "Other Act",
                "day": "Sunday",
                "ratings": [
                    {"name": "alice", "like": -1, "notes": "hm", "rowdy": 2.5},
                    {"name": "bob", "like": 300, "rowdy": "high"},
                    {"name": "carol", "like": 4}
                ]
            }),
        );

        let act = Act::from_document(&doc).unwrap();
        let alice = act.rating("alice").unwrap();
        assert_eq!(alice.like, None);
        assert_eq!(alice.rowdy, None);
        assert_eq!(alice.notes, "hm");
        assert_eq!(act.rating("bob").unwrap().like, None);
        assert_eq!(act.rating("bob").unwrap().rowdy, None);
        assert_eq!(act.rating("carol").unwrap().like, Some(4));
        assert_eq!(act.rating("carol").unwrap().rowdy, None);
    }

    #[test]
    fn test_decode_rejects_unknown_day() {
        let doc = document("doc1", json!({"artist": "X", "day": "Monday"}));
        let err = Act::from_document(&doc).unwrap_err();
        assert!(matches!(err, LineupError::InvalidRecord { .. }));
    }

    #[test]
    fn test_decode_collapses_duplicate_reviewers() {
        let doc = document(
            "doc1",
            json!({
                "artist": "X",
                "day": "Friday",
                "ratings": [
                    {"name": "alice", "like": 1},
                    {"name": "alice", "like": 5}
                ]
            }),
        );
        let act = Act::from_document(&doc).unwrap();
        assert_eq!(act.ratings.len(), 1);
        assert_eq!(act.rating("alice").unwrap().like, Some(1));
    }

    #[test]
    fn test_score_patch_validation() {
        assert_eq!(
            RatingPatch::score(ScoreField::Like, Some(4)),
            Ok(RatingPatch::Score {
                field: ScoreField::Like,
                value: 4
            })
        );
        assert_eq!(
            RatingPatch::score(ScoreField::Rowdy, None),
            Ok(RatingPatch::Score {
                field: ScoreField::Rowdy,
                value: 0
            })
        );
        assert_eq!(
            RatingPatch::score(ScoreField::Like, Some(6)),
            Err(LineupError::ScoreOutOfRange(6))
        );
    }

    #[test]
    fn test_rating_patched_touches_one_field() {
        let rating = Rating {
            name: "alice".to_string(),
            like: Some(2),
            notes: "ok".to_string(),
            rowdy: None,
        };

        let patched = rating.patched(&RatingPatch::score(ScoreField::Rowdy, Some(3)).unwrap());
        assert_eq!(patched.rowdy, Some(3));
        assert_eq!(patched.like, Some(2));
        assert_eq!(patched.notes, "ok");

        let patched = rating.patched(&RatingPatch::notes("great"));
        assert_eq!(patched.notes, "great");
        assert!(patched.already_has(&RatingPatch::notes("great")));
        assert!(!patched.already_has(&RatingPatch::notes("meh")));
    }

    #[test]
    fn test_day_parse() {
        assert_eq!(Day::parse("friday"), Some(Day::Friday));
        assert_eq!(Day::parse(" Sunday "), Some(Day::Sunday));
        assert_eq!(Day::parse("monday"), None);
        assert_eq!(Day::Thursday.to_string(), "Thursday");
    }

    #[test]
    fn test_rating_field_keys() {
        assert_eq!(RatingPatch::notes("x").field().key(), "notes");
        assert_eq!(
            RatingPatch::score(ScoreField::Like, Some(1))
                .unwrap()
                .field()
                .key(),
            "like"
        );
        assert_eq!(ScoreField::Rowdy.key(), "rowdy");
        assert_eq!(RatingPatch::notes("x").json_value(), json!("x"));
    }
}
