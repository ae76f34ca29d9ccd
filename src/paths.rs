//! Acoustic path store.
//!
//! The engine streams its solutions back as messages addressed
//! `/solution/<sid>/path/<pid>/<attr>`. Each message updates one attribute
//! of one path; solutions and paths are created on first reference.
//! `/solution/<sid>/path/deleted <ids...>` removes paths.
//!
//! | attr          | effect |
//! |---------------|--------|
//! | `length`      | path length from the single numeric argument |
//! | `xyz`         | point list, 3 values per point; `order = points - 2` |
//! | `reflectance` | raw coefficient vector |
//! | `image`, `delay` | reserved, ignored |
//!
//! `created`, `number` and `updated` in the path id position are
//! informational and acknowledged without touching the store.

use std::collections::BTreeMap;

use glam::Vec3;

use crate::error::{Error, Result};
use crate::osc::{OscArg, OscMessage};

/// One propagation path from source to listener.
#[derive(Debug, Clone, PartialEq)]
pub struct AcousticPath {
    /// Number of reflections, -1 until points arrive.
    pub order: i32,
    pub length: Option<f32>,
    pub points: Vec<Vec3>,
    pub reflectance: Option<Vec<f32>>,
}

impl Default for AcousticPath {
    fn default() -> Self {
        Self {
            order: -1,
            length: None,
            points: Vec::new(),
            reflectance: None,
        }
    }
}

impl AcousticPath {
    pub fn has_points(&self) -> bool {
        !self.points.is_empty()
    }
}

/// All paths computed for one room/source/listener combination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    paths: BTreeMap<String, AcousticPath>,
}

impl Solution {
    pub fn path(&self, id: &str) -> Option<&AcousticPath> {
        self.paths.get(id)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &AcousticPath)> {
        self.paths.iter().map(|(id, path)| (id.as_str(), path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Point sequences of the paths with `order <= max_order`.
    pub fn paths_with_order_at_most(&self, max_order: i32) -> impl Iterator<Item = &[Vec3]> {
        self.paths
            .values()
            .filter(move |path| path.has_points() && path.order <= max_order)
            .map(|path| path.points.as_slice())
    }
}

/// What an applied message did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathUpdate {
    /// Informational message, nothing stored.
    Acknowledged,
    /// Recognized but intentionally ignored attribute.
    Ignored,
    /// Paths removed from a solution.
    Deleted { solution: String, removed: usize },
    /// One path attribute written.
    Updated { solution: String, path: String },
}

impl PathUpdate {
    /// Whether the update changed stored state.
    pub fn is_change(&self) -> bool {
        match self {
            PathUpdate::Deleted { removed, .. } => *removed > 0,
            PathUpdate::Updated { .. } => true,
            PathUpdate::Acknowledged | PathUpdate::Ignored => false,
        }
    }
}

/// Store of every solution received in this process.
#[derive(Debug, Clone, Default)]
pub struct PathStore {
    solutions: BTreeMap<String, Solution>,
}

impl PathStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound message.
    ///
    /// Errors are non-fatal: the message (or the single attribute update) is
    /// discarded and the store is left as it was.
    pub fn apply(&mut self, message: &OscMessage) -> Result<PathUpdate> {
        let address = message.address.as_str();
        let segments: Vec<&str> = address.trim_start_matches('/').split('/').collect();
        let unrecognized = || Error::UnrecognizedAddress(address.to_string());

        if segments.first() != Some(&"solution") {
            return Err(unrecognized());
        }
        let (Some(&solution_id), Some(&"path"), Some(&selector)) =
            (segments.get(1), segments.get(2), segments.get(3))
        else {
            return Err(unrecognized());
        };

        match selector {
            "created" | "number" | "updated" => return Ok(PathUpdate::Acknowledged),
            "deleted" => return Ok(self.delete_paths(solution_id, message.args.iter().flat_map(arg_ids))),
            _ => {}
        }

        let path_id = selector;
        let Some(&attr) = segments.get(4) else {
            return Err(unrecognized());
        };

        match attr {
            "length" => {
                let length = message
                    .args
                    .first()
                    .and_then(OscArg::as_f32)
                    .ok_or_else(|| Error::MalformedMessage(format!("{}: expected one numeric argument", address)))?;
                self.path_mut(solution_id, path_id).length = Some(length);
            }
            "xyz" => {
                let values = numeric_values(address, &message.args)?;
                if values.len() % 3 != 0 {
                    return Err(Error::MalformedPath {
                        solution: solution_id.to_string(),
                        path: path_id.to_string(),
                        value_count: values.len(),
                    });
                }
                let points: Vec<Vec3> = values
                    .chunks_exact(3)
                    .map(|c| Vec3::new(c[0], c[1], c[2]))
                    .collect();
                let path = self.path_mut(solution_id, path_id);
                path.order = points.len() as i32 - 2;
                path.points = points;
            }
            "reflectance" => {
                let values = numeric_values(address, &message.args)?;
                self.path_mut(solution_id, path_id).reflectance = Some(values);
            }
            "created" | "number" | "updated" => return Ok(PathUpdate::Acknowledged),
            "deleted" => {
                // Without arguments the addressed path itself goes
                let ids: Vec<String> = if message.args.is_empty() {
                    vec![path_id.to_string()]
                } else {
                    message.args.iter().flat_map(arg_ids).collect()
                };
                return Ok(self.delete_paths(solution_id, ids));
            }
            "image" | "delay" => return Ok(PathUpdate::Ignored),
            _ => return Err(unrecognized()),
        }

        Ok(PathUpdate::Updated {
            solution: solution_id.to_string(),
            path: path_id.to_string(),
        })
    }

    fn path_mut(&mut self, solution_id: &str, path_id: &str) -> &mut AcousticPath {
        self.solutions
            .entry(solution_id.to_string())
            .or_default()
            .paths
            .entry(path_id.to_string())
            .or_default()
    }

    fn delete_paths(&mut self, solution_id: &str, ids: impl IntoIterator<Item = String>) -> PathUpdate {
        let solution = self.solutions.entry(solution_id.to_string()).or_default();
        let mut removed = 0;
        for id in ids {
            if solution.paths.remove(&id).is_some() {
                removed += 1;
            }
        }
        PathUpdate::Deleted {
            solution: solution_id.to_string(),
            removed,
        }
    }

    pub fn solution(&self, id: &str) -> Option<&Solution> {
        self.solutions.get(id)
    }

    pub fn solutions(&self) -> impl Iterator<Item = (&str, &Solution)> {
        self.solutions.iter().map(|(id, s)| (id.as_str(), s))
    }

    /// Point sequences of every path in every solution with `order <= max_order`.
    pub fn paths_with_order_at_most(&self, max_order: i32) -> impl Iterator<Item = &[Vec3]> {
        self.solutions
            .values()
            .flat_map(move |solution| solution.paths_with_order_at_most(max_order))
    }

    pub fn solution_count(&self) -> usize {
        self.solutions.len()
    }

    pub fn path_count(&self) -> usize {
        self.solutions.values().map(Solution::len).sum()
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!("{} solutions, {} paths", self.solution_count(), self.path_count())
    }

    pub fn clear(&mut self) {
        self.solutions.clear();
    }
}

/// Flatten numeric arguments (scalars and float arrays) into one list.
fn numeric_values(address: &str, args: &[OscArg]) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            OscArg::FloatArray(array) => values.extend_from_slice(array),
            other => values.push(other.as_f32().ok_or_else(|| {
                Error::MalformedMessage(format!("{}: non-numeric argument '{}'", address, other))
            })?),
        }
    }
    Ok(values)
}

/// Path ids named by one argument of a deletion message.
fn arg_ids(arg: &OscArg) -> Vec<String> {
    match arg {
        OscArg::FloatArray(values) => values
            .iter()
            .filter_map(|v| OscArg::Float(*v).as_id())
            .collect(),
        other => other.as_id().into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(address: &str, args: Vec<OscArg>) -> OscMessage {
        OscMessage::new(address, args)
    }

    fn floats(values: &[f32]) -> Vec<OscArg> {
        values.iter().copied().map(OscArg::Float).collect()
    }

    #[test]
    fn test_direct_path_has_order_zero() {
        let mut store = PathStore::new();
        let update = store
            .apply(&msg("/solution/1/path/5/xyz", floats(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0])))
            .unwrap();
        assert!(update.is_change());

        let path = store.solution("1").unwrap().path("5").unwrap();
        assert_eq!(path.order, 0);
        assert_eq!(path.points, vec![Vec3::ZERO, Vec3::ONE]);
    }

    #[test]
    fn test_reflection_order_from_point_count() {
        let mut store = PathStore::new();
        store
            .apply(&msg("/solution/1/path/7/xyz", floats(&[0.0; 12])))
            .unwrap();
        assert_eq!(store.solution("1").unwrap().path("7").unwrap().order, 2);
    }

    #[test]
    fn test_bad_point_count_keeps_prior_state() {
        let mut store = PathStore::new();
        store
            .apply(&msg("/solution/1/path/5/xyz", floats(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0])))
            .unwrap();
        let before = store.solution("1").unwrap().path("5").unwrap().clone();

        let err = store
            .apply(&msg("/solution/1/path/5/xyz", floats(&[1.0, 2.0, 3.0, 4.0])))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPath { value_count: 4, .. }));
        assert_eq!(store.solution("1").unwrap().path("5").unwrap(), &before);
    }

    #[test]
    fn test_bad_point_count_does_not_create_path() {
        let mut store = PathStore::new();
        assert!(store
            .apply(&msg("/solution/2/path/1/xyz", floats(&[1.0, 2.0])))
            .is_err());
        assert_eq!(store.path_count(), 0);
    }

    #[test]
    fn test_partial_updates_accumulate() {
        let mut store = PathStore::new();
        store.apply(&msg("/solution/1/path/3/length", floats(&[12.5]))).unwrap();
        store
            .apply(&msg("/solution/1/path/3/reflectance", floats(&[0.9, 0.8, 0.7])))
            .unwrap();

        let path = store.solution("1").unwrap().path("3").unwrap();
        assert_eq!(path.length, Some(12.5));
        assert_eq!(path.reflectance, Some(vec![0.9, 0.8, 0.7]));
        assert_eq!(path.order, -1);
        assert!(!path.has_points());

        store
            .apply(&msg("/solution/1/path/3/xyz", floats(&[0.0; 9])))
            .unwrap();
        let path = store.solution("1").unwrap().path("3").unwrap();
        assert_eq!(path.length, Some(12.5));
        assert_eq!(path.order, 1);
    }

    #[test]
    fn test_length_accepts_int() {
        let mut store = PathStore::new();
        store
            .apply(&msg("/solution/1/path/3/length", vec![OscArg::Int(4)]))
            .unwrap();
        assert_eq!(store.solution("1").unwrap().path("3").unwrap().length, Some(4.0));

        assert!(matches!(
            store.apply(&msg("/solution/1/path/3/length", vec![])),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_delete_listed_paths() {
        let mut store = PathStore::new();
        for id in ["1", "2", "3"] {
            store
                .apply(&msg(&format!("/solution/9/path/{}/xyz", id), floats(&[0.0; 6])))
                .unwrap();
        }

        let update = store
            .apply(&msg("/solution/9/path/deleted", vec![OscArg::Int(1), OscArg::Int(3)]))
            .unwrap();
        assert_eq!(
            update,
            PathUpdate::Deleted {
                solution: "9".to_string(),
                removed: 2
            }
        );
        let ids: Vec<&str> = store.solution("9").unwrap().paths().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_delete_unknown_ids_is_noop() {
        let mut store = PathStore::new();
        store
            .apply(&msg("/solution/1/path/5/xyz", floats(&[0.0; 6])))
            .unwrap();

        let update = store
            .apply(&msg("/solution/1/path/deleted", vec![OscArg::Int(42), OscArg::Str("x".into())]))
            .unwrap();
        assert!(!update.is_change());
        assert_eq!(store.path_count(), 1);
    }

    #[test]
    fn test_delete_accepts_array_argument() {
        let mut store = PathStore::new();
        store
            .apply(&msg("/solution/1/path/5/xyz", floats(&[0.0; 6])))
            .unwrap();
        store
            .apply(&msg("/solution/1/path/deleted", vec![OscArg::FloatArray(vec![5.0])]))
            .unwrap();
        assert_eq!(store.path_count(), 0);
    }

    #[test]
    fn test_informational_messages_are_acknowledged() {
        let mut store = PathStore::new();
        for selector in ["created", "number", "updated"] {
            let update = store
                .apply(&msg(&format!("/solution/1/path/{}", selector), vec![OscArg::Int(3)]))
                .unwrap();
            assert_eq!(update, PathUpdate::Acknowledged);
        }
        assert_eq!(store.solution_count(), 0);
    }

    #[test]
    fn test_informational_attributes_are_acknowledged() {
        let mut store = PathStore::new();
        for attr in ["created", "number", "updated"] {
            let update = store
                .apply(&msg(&format!("/solution/1/path/5/{}", attr), vec![]))
                .unwrap();
            assert_eq!(update, PathUpdate::Acknowledged);
        }
        assert_eq!(store.path_count(), 0);
    }

    #[test]
    fn test_deleted_attribute_removes_paths() {
        let mut store = PathStore::new();
        for id in ["4", "5", "6"] {
            store
                .apply(&msg(&format!("/solution/2/path/{}/xyz", id), floats(&[0.0; 6])))
                .unwrap();
        }

        let update = store.apply(&msg("/solution/2/path/5/deleted", vec![])).unwrap();
        assert_eq!(
            update,
            PathUpdate::Deleted {
                solution: "2".to_string(),
                removed: 1
            }
        );

        store
            .apply(&msg("/solution/2/path/0/deleted", vec![OscArg::Int(6)]))
            .unwrap();
        let ids: Vec<&str> = store.solution("2").unwrap().paths().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["4"]);
    }

    #[test]
    fn test_reserved_attributes_are_ignored() {
        let mut store = PathStore::new();
        for attr in ["image", "delay"] {
            let update = store
                .apply(&msg(&format!("/solution/1/path/2/{}", attr), floats(&[1.0])))
                .unwrap();
            assert_eq!(update, PathUpdate::Ignored);
        }
        assert_eq!(store.path_count(), 0);
    }

    #[test]
    fn test_unrecognized_addresses() {
        let mut store = PathStore::new();
        for address in [
            "/dsp",
            "/solutions/1/path/2/xyz",
            "/solution/1/source/2/xyz",
            "/solution/1/path/2/colour",
            "/solution/1/path/2",
            "/solution/1",
        ] {
            let err = store.apply(&msg(address, vec![])).unwrap_err();
            assert!(matches!(err, Error::UnrecognizedAddress(_)), "{address}");
        }
    }

    #[test]
    fn test_order_filtered_query() {
        let mut store = PathStore::new();
        store.apply(&msg("/solution/1/path/a/xyz", floats(&[0.0; 6]))).unwrap();
        store.apply(&msg("/solution/1/path/b/xyz", floats(&[0.0; 9]))).unwrap();
        store.apply(&msg("/solution/2/path/c/xyz", floats(&[0.0; 12]))).unwrap();
        // No points yet: never returned
        store.apply(&msg("/solution/2/path/d/length", floats(&[3.0]))).unwrap();

        assert_eq!(store.paths_with_order_at_most(0).count(), 1);
        assert_eq!(store.paths_with_order_at_most(1).count(), 2);
        assert_eq!(store.paths_with_order_at_most(10).count(), 3);
        assert_eq!(store.solution("2").unwrap().paths_with_order_at_most(10).count(), 1);
        assert_eq!(store.summary(), "2 solutions, 4 paths");

        store.clear();
        assert_eq!(store.paths_with_order_at_most(10).count(), 0);
    }
}
