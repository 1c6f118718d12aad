//! Marker store: positional markers for every map, in one list.
//!
//! Storage is not partitioned by map. Every read filters on `map_id`.

use crate::map_view::{GridCell, Point};
use mapview_env::{MapId, MarkerRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type MarkerId = u64;

/// A marker placed on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub cell: GridCell,
    /// World X in meters, 2 decimal places
    pub world_x: String,
    /// World Y in meters, 2 decimal places
    pub world_y: String,
    pub label: String,
    pub selected: bool,
    pub map_id: MapId,
    /// Heading for goto commands, in degrees
    pub angle: Option<f64>,
}

impl Marker {
    /// World position parsed back from the 2-dp strings.
    pub fn world(&self) -> Option<Point> {
        let x = self.world_x.parse::<f64>().ok()?;
        let y = self.world_y.parse::<f64>().ok()?;
        Some(Point::new(x, y))
    }
}

impl From<MarkerRecord> for Marker {
    fn from(record: MarkerRecord) -> Self {
        Self {
            id: record.id,
            cell: GridCell::new(record.x, record.y),
            world_x: record.world_x,
            world_y: record.world_y,
            label: record.label,
            selected: record.selected,
            map_id: record.map_id,
            angle: record.angle,
        }
    }
}

impl From<&Marker> for MarkerRecord {
    fn from(marker: &Marker) -> Self {
        Self {
            id: marker.id,
            x: marker.cell.x,
            y: marker.cell.y,
            world_x: marker.world_x.clone(),
            world_y: marker.world_y.clone(),
            label: marker.label.clone(),
            selected: marker.selected,
            map_id: marker.map_id.clone(),
            angle: marker.angle,
        }
    }
}

/// A click position proposed as a new marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerCandidate {
    pub cell: GridCell,
    pub world: Point,
}

/// Formats a world coordinate the way markers and readouts show it.
pub fn format_meters(value: f64) -> String {
    format!("{:.2}", value)
}

/// Integer prefix of a label, ignoring leading whitespace.
///
/// `"12"` and `"12b"` give 12; `"x"` gives nothing.
fn leading_int(label: &str) -> Option<i64> {
    let s = label.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

#[derive(Debug, Default, Clone)]
pub struct MarkerStore {
    markers: Vec<Marker>,
    saved: HashMap<MapId, Vec<Marker>>,
    last_id: MarkerId,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn for_map<'a>(&'a self, map_id: &'a MapId) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers.iter().filter(move |m| &m.map_id == map_id)
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    /// Label for the next marker on `map_id`: highest numeric label + 1.
    pub fn next_label(&self, map_id: &MapId) -> String {
        let max = self
            .for_map(map_id)
            .filter_map(|m| leading_int(&m.label))
            .fold(0, i64::max);
        max.saturating_add(1).to_string()
    }

    /// Whether a marker on `map_id` lies within `threshold` cells on both axes.
    pub fn is_too_close(&self, map_id: &MapId, cell: GridCell, threshold: i32) -> bool {
        let Ok(threshold) = u32::try_from(threshold) else {
            return false;
        };
        self.for_map(map_id).any(|m| {
            m.cell.x.abs_diff(cell.x) < threshold && m.cell.y.abs_diff(cell.y) < threshold
        })
    }

    /// Adds the candidate unless it duplicates a nearby marker.
    ///
    /// `now_ms` seeds the id; ids stay strictly increasing even when two
    /// markers land in the same millisecond.
    pub fn add_if_far(
        &mut self,
        candidate: MarkerCandidate,
        map_id: &MapId,
        threshold: i32,
        now_ms: u64,
    ) -> Option<MarkerId> {
        if self.is_too_close(map_id, candidate.cell, threshold) {
            tracing::debug!(
                "Marker at ({}, {}) rejected: too close to an existing marker",
                candidate.cell.x,
                candidate.cell.y
            );
            return None;
        }

        let id = now_ms.max(self.last_id.saturating_add(1));
        self.last_id = id;
        let marker = Marker {
            id,
            cell: candidate.cell,
            world_x: format_meters(candidate.world.x),
            world_y: format_meters(candidate.world.y),
            label: self.next_label(map_id),
            selected: false,
            map_id: map_id.clone(),
            angle: None,
        };
        tracing::debug!("Marker {} added as label {}", id, marker.label);
        self.markers.push(marker);
        Some(id)
    }

    /// Flips `selected`, returning the new value.
    pub fn toggle_selected(&mut self, id: MarkerId) -> Option<bool> {
        let marker = self.markers.iter_mut().find(|m| m.id == id)?;
        marker.selected = !marker.selected;
        Some(marker.selected)
    }

    /// Replaces the label with free text.
    pub fn relabel(&mut self, id: MarkerId, label: impl Into<String>) -> bool {
        match self.markers.iter_mut().find(|m| m.id == id) {
            Some(marker) => {
                marker.label = label.into();
                true
            }
            None => false,
        }
    }

    pub fn set_angle(&mut self, id: MarkerId, angle: Option<f64>) -> bool {
        match self.markers.iter_mut().find(|m| m.id == id) {
            Some(marker) => {
                marker.angle = angle;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.id == id)?;
        Some(self.markers.remove(index))
    }

    /// Removes every marker of `map_id`; others are kept.
    pub fn clear_map(&mut self, map_id: &MapId) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| &m.map_id != map_id);
        before - self.markers.len()
    }

    /// Installs a freshly loaded marker set for `map_id` and marks it saved.
    pub fn replace_for_map(&mut self, map_id: &MapId, loaded: Vec<Marker>) {
        self.clear_map(map_id);
        for mut marker in loaded {
            marker.map_id = map_id.clone();
            self.last_id = self.last_id.max(marker.id);
            self.markers.push(marker);
        }
        self.mark_saved(map_id);
    }

    /// Records the current markers of `map_id` as persisted.
    pub fn mark_saved(&mut self, map_id: &MapId) {
        let snapshot = self.for_map(map_id).cloned().collect();
        self.saved.insert(map_id.clone(), snapshot);
    }

    /// Whether `map_id` has changes since the last load or save.
    pub fn is_dirty(&self, map_id: &MapId) -> bool {
        let current: Vec<&Marker> = self.for_map(map_id).collect();
        match self.saved.get(map_id) {
            Some(saved) => current.len() != saved.len() || current.iter().zip(saved).any(|(a, b)| *a != b),
            None => !current.is_empty(),
        }
    }

    /// Wire records for `map_id`, in insertion order.
    pub fn records(&self, map_id: &MapId) -> Vec<MarkerRecord> {
        self.for_map(map_id).map(MarkerRecord::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: i32, y: i32) -> MarkerCandidate {
        MarkerCandidate {
            cell: GridCell::new(x, y),
            world: Point::new(x as f64 * 0.05, y as f64 * 0.05),
        }
    }

    fn map_a() -> MapId {
        MapId::new("a")
    }

    #[test]
    fn test_dedup_threshold() {
        let mut store = MarkerStore::new();
        assert!(store.add_if_far(candidate(10, 10), &map_a(), 5, 1).is_some());
        assert!(store.add_if_far(candidate(14, 14), &map_a(), 5, 2).is_none());
        assert_eq!(store.for_map(&map_a()).count(), 1);

        assert!(store.add_if_far(candidate(20, 10), &map_a(), 5, 3).is_some());
        assert_eq!(store.for_map(&map_a()).count(), 2);

        // Close on one axis only is not a duplicate.
        assert!(store.add_if_far(candidate(11, 40), &map_a(), 5, 4).is_some());
    }

    #[test]
    fn test_dedup_is_per_map() {
        let mut store = MarkerStore::new();
        store.add_if_far(candidate(10, 10), &map_a(), 5, 1);
        assert!(store
            .add_if_far(candidate(10, 10), &MapId::new("b"), 5, 2)
            .is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_label_after_largest_integer_label() {
        let mut store = MarkerStore::new();
        let first = store.add_if_far(candidate(10, 10), &map_a(), 5, 1).unwrap();
        assert!(store.relabel(first, "9223372036854775807"));

        let second = store.add_if_far(candidate(50, 50), &map_a(), 5, 2).unwrap();
        assert_eq!(store.get(second).unwrap().label, "9223372036854775807");
    }

    #[test]
    fn test_dedup_with_extreme_cells() {
        let mut store = MarkerStore::new();
        store.add_if_far(candidate(i32::MIN, i32::MAX), &map_a(), 5, 1);

        assert!(!store.is_too_close(&map_a(), GridCell::new(i32::MAX, i32::MIN), 5));
        assert!(store.is_too_close(&map_a(), GridCell::new(i32::MIN + 4, i32::MAX - 4), 5));
        assert!(store.add_if_far(candidate(0, 0), &map_a(), 5, 2).is_some());
        // A negative threshold never treats anything as a duplicate.
        assert!(!store.is_too_close(&map_a(), GridCell::new(0, 0), -1));
    }

    #[test]
    fn test_next_label() {
        let mut store = MarkerStore::new();
        assert_eq!(store.next_label(&map_a()), "1");

        for (i, (x, label)) in [(0, "1"), (20, "3"), (40, "x")].into_iter().enumerate() {
            let id = store.add_if_far(candidate(x, 0), &map_a(), 5, i as u64).unwrap();
            store.relabel(id, label);
        }
        assert_eq!(store.next_label(&map_a()), "4");
        assert_eq!(store.next_label(&MapId::new("other")), "1");

        let id = store.add_if_far(candidate(60, 0), &map_a(), 5, 9).unwrap();
        assert_eq!(store.get(id).unwrap().label, "4");
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("12"), Some(12));
        assert_eq!(leading_int(" 7b"), Some(7));
        assert_eq!(leading_int("-2"), Some(-2));
        assert_eq!(leading_int("x1"), None);
        assert_eq!(leading_int(""), None);
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut store = MarkerStore::new();
        let a = store.add_if_far(candidate(0, 0), &map_a(), 5, 1000).unwrap();
        let b = store.add_if_far(candidate(50, 0), &map_a(), 5, 1000).unwrap();
        let c = store.add_if_far(candidate(100, 0), &map_a(), 5, 900).unwrap();
        assert_eq!((a, b, c), (1000, 1001, 1002));
    }

    #[test]
    fn test_mutations() {
        let mut store = MarkerStore::new();
        let id = store.add_if_far(candidate(3, 4), &map_a(), 5, 1).unwrap();
        let marker = store.get(id).unwrap();
        assert_eq!(marker.world_x, "0.15");
        assert_eq!(marker.world_y, "0.20");
        assert!(!marker.selected);

        assert_eq!(store.toggle_selected(id), Some(true));
        assert_eq!(store.toggle_selected(id), Some(false));
        assert_eq!(store.toggle_selected(999), None);
        assert!(store.relabel(id, "dock"));
        assert!(!store.relabel(999, "nope"));

        store.add_if_far(candidate(30, 30), &MapId::new("b"), 5, 2);
        assert_eq!(store.clear_map(&map_a()), 1);
        assert_eq!(store.len(), 1);
        assert!(store.remove(id).is_none());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut store = MarkerStore::new();
        assert!(!store.is_dirty(&map_a()));

        store.add_if_far(candidate(0, 0), &map_a(), 5, 1);
        assert!(store.is_dirty(&map_a()));
        store.mark_saved(&map_a());
        assert!(!store.is_dirty(&map_a()));

        let id = store.for_map(&map_a()).next().unwrap().id;
        store.relabel(id, "home");
        assert!(store.is_dirty(&map_a()));
    }

    #[test]
    fn test_replace_and_records() {
        let mut store = MarkerStore::new();
        store.add_if_far(candidate(0, 0), &map_a(), 5, 1);

        let record = MarkerRecord {
            id: 5_000,
            x: 7,
            y: 8,
            world_x: "0.35".into(),
            world_y: "0.40".into(),
            label: "2".into(),
            selected: true,
            map_id: MapId::new("stale"),
            angle: Some(90.0),
        };
        store.replace_for_map(&map_a(), vec![Marker::from(record)]);
        assert_eq!(store.len(), 1);
        assert!(!store.is_dirty(&map_a()));

        let records = store.records(&map_a());
        assert_eq!(records[0].map_id, map_a());
        assert_eq!(records[0].angle, Some(90.0));

        // Newly added ids never collide with loaded ones.
        let id = store.add_if_far(candidate(50, 50), &map_a(), 5, 10).unwrap();
        assert_eq!(id, 5_001);
        assert_eq!(store.get(id).unwrap().label, "3");
    }
}
