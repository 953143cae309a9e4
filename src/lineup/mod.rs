mod import;
mod models;

pub use import::{import_lineup, ImportSummary, LineupFile};
pub use models::{
    Act, ActRecord, Day, LineupError, Rating, RatingField, RatingPatch, ScoreField, MAX_SCORE,
};
