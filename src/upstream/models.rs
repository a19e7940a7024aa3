//! Wire types for the upstream group schedule endpoint.
//!
//! The feed is loosely typed: strings may be `null`, empty collections are
//! sometimes encoded as `[]` instead of `{}`, and `e_link` is either a string
//! or `false`. Everything here is lenient so a single odd field does not
//! discard a whole group.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

/// Message upstream sends with a non-ok status when a group simply has no
/// schedule for the requested mode.
pub const NO_SCHEDULE_MESSAGE: &str = "Не нашлось расписание для группы";

/// Lessons keyed by day key, then by slot number.
pub type RawGrid = HashMap<String, HashMap<String, Vec<RawLesson>>>;

#[derive(Debug, Clone, Deserialize)]
pub struct GroupResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_grid")]
    pub grid: RawGrid,
    #[serde(default, rename = "isSession", deserialize_with = "null_as_default")]
    pub is_session: bool,
}

impl GroupResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLesson {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sbj: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub teacher: String,
    /// Session date text, e.g. `"10 Июн"`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dts: String,
    /// Term range start (`YYYY-MM-DD`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub df: String,
    /// Term range end (`YYYY-MM-DD`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub dt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auditories: Vec<RawAuditory>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default)]
    pub e_link: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAuditory {
    /// Markup-laden room title; may contain an `<a href>` and emoji.
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A JSON object, or an array standing in for one (PHP encodes empty and
/// zero-indexed maps as arrays).
#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrSeq<T> {
    Map(HashMap<String, T>),
    Seq(Vec<T>),
}

impl<T> MapOrSeq<T> {
    fn into_map(self) -> HashMap<String, T> {
        match self {
            Self::Map(map) => map,
            Self::Seq(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        }
    }
}

fn lenient_grid<'de, D>(deserializer: D) -> Result<RawGrid, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(days) = Option::<MapOrSeq<Option<MapOrSeq<Option<Vec<RawLesson>>>>>>::deserialize(
        deserializer,
    )?
    else {
        return Ok(RawGrid::new());
    };

    Ok(days
        .into_map()
        .into_iter()
        .map(|(day, slots)| {
            let slots = slots
                .map(|s| {
                    s.into_map()
                        .into_iter()
                        .map(|(slot, lessons)| (slot, lessons.unwrap_or_default()))
                        .collect()
                })
                .unwrap_or_default();
            (day, slots)
        })
        .collect())
}
