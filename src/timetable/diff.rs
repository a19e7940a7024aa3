//! Per-cell comparison between a fresh upstream payload and stored state.

use std::collections::BTreeSet;

use super::normalize::{Lesson, NormalizedGrid};
use super::slots::CellKey;
use super::week::{Pair, Week};
use crate::utils::{collapse_whitespace, sort_case_insensitive};

/// What the writer has to do for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stored state already matches the payload.
    NoOp,
    /// The payload has nothing for this cell; stored rows must go.
    RemoveOnly,
    /// Stored rows (if any) must be replaced with the payload.
    Replace,
}

/// Compare one cell's parsed pairs against its persisted pairs.
///
/// Pair order within the cell and teacher/room order within a pair do not
/// matter. Text fields are compared after trimming and an empty link is the
/// same as no link.
pub fn decide(parsed: &[Pair], persisted: &[Pair]) -> Decision {
    match (parsed.is_empty(), persisted.is_empty()) {
        (true, true) => Decision::NoOp,
        (true, false) => Decision::RemoveOnly,
        _ if canonical(parsed) == canonical(persisted) => Decision::NoOp,
        _ => Decision::Replace,
    }
}

fn canonical(pairs: &[Pair]) -> Vec<Pair> {
    let mut out: Vec<Pair> = pairs.iter().map(canonical_pair).collect();
    out.sort();
    out
}

fn canonical_pair(pair: &Pair) -> Pair {
    let clean_list = |values: &[String]| {
        let mut values: Vec<String> = values
            .iter()
            .map(|v| collapse_whitespace(v))
            .filter(|v| !v.is_empty())
            .collect();
        sort_case_insensitive(&mut values);
        values
    };
    Pair {
        subject: pair.subject.trim().to_string(),
        teachers: clean_list(&pair.teachers),
        start_date: pair.start_date,
        end_date: pair.end_date,
        rooms: clean_list(&pair.rooms),
        location: pair.location.trim().to_string(),
        kind: pair.kind.trim().to_string(),
        link: pair
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
    }
}

/// The work for one cell: rows to delete and lessons to insert.
#[derive(Debug, Clone)]
pub struct CellPlan {
    pub cell: CellKey,
    pub decision: Decision,
    /// Persisted pairs to delete (empty for `NoOp`).
    pub stale: Vec<Pair>,
    /// Lessons to insert (only for `Replace`).
    pub fresh: Vec<Lesson>,
}

/// Plan every cell that appears in either the payload or the stored week.
///
/// Cells the normalizer marked unsettled get no plan, so their stored rows
/// are kept as they are.
pub fn plan_cells(parsed: &NormalizedGrid, persisted: &Week) -> Vec<CellPlan> {
    let unsettled = parsed.unsettled_cells();
    let cells: BTreeSet<CellKey> = parsed
        .cells
        .keys()
        .copied()
        .chain(persisted.cells())
        .filter(|cell| !unsettled.contains(cell))
        .collect();

    cells
        .into_iter()
        .map(|cell| {
            let lessons = parsed.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[]);
            let fresh_pairs: Vec<Pair> = lessons.iter().map(Pair::from).collect();
            let stored = persisted.pairs(cell);
            let decision = decide(&fresh_pairs, stored);
            let (stale, fresh) = match decision {
                Decision::NoOp => (Vec::new(), Vec::new()),
                Decision::RemoveOnly => (stored.to_vec(), Vec::new()),
                Decision::Replace => (stored.to_vec(), lessons.to_vec()),
            };
            CellPlan {
                cell,
                decision,
                stale,
                fresh,
            }
        })
        .collect()
}
