//! Named per-point attribute arrays with modification times.
//!
//! Derived fields such as curvature are stored here, next to the geometry
//! they were computed from. Each array carries the [`ModifiedTime`] of its
//! last write so that consumers can tell whether it is older than the
//! geometry and needs recomputing.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::error::{Result, SculptError};

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// A point on the process-wide modification clock.
///
/// Times only increase. The default value is older than every time handed out
/// by [`ModifiedTime::now`], so a freshly declared array is always stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModifiedTime(u64);

impl ModifiedTime {
    /// Draw a new time, later than every time drawn before.
    pub fn now() -> Self {
        ModifiedTime(CLOCK.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// How values of an array are combined when points are merged or inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// Continuous values, interpolated.
    Float,
    /// On/off values such as the status mask, combined by minimum.
    Flag,
}

/// Declaration of a point-data array an energy term depends on.
///
/// Terms hold these as lightweight handles and look the array up by
/// [`FieldSpec::key`] whenever they need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Array name.
    pub name: Cow<'static, str>,
    /// Number of components per point.
    pub components: usize,
    /// Storage kind.
    pub kind: ArrayKind,
    /// Whether other terms may reuse the array under its plain name.
    pub shared: bool,
}

impl FieldSpec {
    /// A shared scalar array.
    pub fn shared(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            kind: ArrayKind::Float,
            shared: true,
        }
    }

    /// A scalar array private to one term.
    pub fn private(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            shared: false,
            ..Self::shared(name)
        }
    }

    /// Set the number of components.
    pub fn with_components(mut self, components: usize) -> Self {
        self.components = components;
        self
    }

    /// Set the storage kind.
    pub fn with_kind(mut self, kind: ArrayKind) -> Self {
        self.kind = kind;
        self
    }

    /// Name under which the array is stored for the given owner.
    ///
    /// Shared arrays use their plain name; private arrays are prefixed with
    /// the owner name.
    pub fn key(&self, owner: &str) -> String {
        if self.shared || owner.is_empty() {
            self.name.to_string()
        } else {
            format!("{}/{}", owner, self.name)
        }
    }
}

/// A named per-point array.
#[derive(Debug, Clone)]
pub struct PointDataArray {
    name: String,
    components: usize,
    kind: ArrayKind,
    values: Vec<f64>,
    mtime: ModifiedTime,
}

impl PointDataArray {
    /// Create an array of `num_points` tuples filled with `fill`.
    ///
    /// The array starts out with the default (oldest) modification time.
    pub fn new(
        name: impl Into<String>,
        components: usize,
        kind: ArrayKind,
        num_points: usize,
        fill: f64,
    ) -> Self {
        Self {
            name: name.into(),
            components,
            kind,
            values: vec![fill; num_points * components],
            mtime: ModifiedTime::default(),
        }
    }

    /// Array name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of components per point.
    pub fn components(&self) -> usize {
        self.components
    }

    /// Storage kind.
    pub fn kind(&self) -> ArrayKind {
        self.kind
    }

    /// Number of points the array covers.
    pub fn num_tuples(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }

    /// All values, point-major.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// First component of point `i`.
    #[inline]
    pub fn scalar(&self, i: usize) -> f64 {
        self.values[i * self.components]
    }

    /// All components of point `i`.
    #[inline]
    pub fn tuple(&self, i: usize) -> &[f64] {
        &self.values[i * self.components..(i + 1) * self.components]
    }

    /// Time of the last write.
    #[inline]
    pub fn modified_time(&self) -> ModifiedTime {
        self.mtime
    }

    /// Whether the array is older than `reference`.
    #[inline]
    pub fn is_older_than(&self, reference: ModifiedTime) -> bool {
        self.mtime < reference
    }

    /// Mutable access to the values. Stamps the array as modified.
    pub fn values_mut(&mut self) -> &mut [f64] {
        self.mtime = ModifiedTime::now();
        &mut self.values
    }

    /// Replace all values. Stamps the array as modified.
    pub fn replace(&mut self, values: Vec<f64>) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(SculptError::FieldLength {
                name: self.name.clone(),
                expected: self.values.len(),
                actual: values.len(),
            });
        }
        self.values = values;
        self.mtime = ModifiedTime::now();
        Ok(())
    }

    /// Rebuild the array for a new point set.
    ///
    /// `sources[i]` lists the old points that new point `i` was made from.
    /// Float arrays average them, flag arrays take the minimum. The
    /// modification time is left unchanged.
    pub(crate) fn remap(&mut self, sources: &[Vec<usize>]) {
        let c = self.components;
        if c == 0 {
            return;
        }
        let old = &self.values;
        let kind = self.kind;
        let mut values = vec![0.0; sources.len() * c];
        values
            .par_chunks_mut(c)
            .zip(sources.par_iter())
            .filter(|(_, from)| !from.is_empty())
            .for_each(|(tuple, from)| {
                for (k, v) in tuple.iter_mut().enumerate() {
                    let merged = from.iter().map(|&j| old[j * c + k]);
                    *v = match kind {
                        ArrayKind::Float => merged.sum::<f64>() / from.len() as f64,
                        ArrayKind::Flag => merged.fold(f64::INFINITY, f64::min),
                    };
                }
            });
        self.values = values;
    }
}

/// Ordered collection of point-data arrays, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct PointDataStore {
    arrays: Vec<PointDataArray>,
}

impl PointDataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of arrays.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Whether an array with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.arrays.iter().position(|a| a.name == name)
    }

    /// Look up an array.
    pub fn get(&self, name: &str) -> Option<&PointDataArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    /// Look up an array mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut PointDataArray> {
        self.arrays.iter_mut().find(|a| a.name == name)
    }

    /// Values of an array.
    pub fn values(&self, name: &str) -> Option<&[f64]> {
        self.get(name).map(PointDataArray::values)
    }

    /// Declare an array for `owner`.
    ///
    /// Returns `Ok(true)` if the array was created and `Ok(false)` if an array
    /// of the same name and shape already existed.
    pub fn declare(&mut self, owner: &str, spec: &FieldSpec, num_points: usize) -> Result<bool> {
        let key = spec.key(owner);
        if let Some(existing) = self.get(&key) {
            if existing.components != spec.components {
                return Err(SculptError::FieldShapeMismatch {
                    name: key,
                    existing: existing.components,
                    requested: spec.components,
                });
            }
            return Ok(false);
        }
        self.arrays.push(PointDataArray::new(
            key,
            spec.components,
            spec.kind,
            num_points,
            0.0,
        ));
        Ok(true)
    }

    /// Insert an array, replacing any array of the same name.
    ///
    /// Fails with [`SculptError::FieldLength`] unless the array holds
    /// `num_points` tuples.
    pub fn add(&mut self, array: PointDataArray, num_points: usize) -> Result<()> {
        let expected = num_points * array.components;
        if array.values.len() != expected {
            return Err(SculptError::FieldLength {
                name: array.name,
                expected,
                actual: array.values.len(),
            });
        }
        match self.index_of(&array.name) {
            Some(i) => self.arrays[i] = array,
            None => self.arrays.push(array),
        }
        Ok(())
    }

    /// Replace the values of an existing array.
    pub fn replace(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.get_mut(name)
            .ok_or_else(|| SculptError::MissingPointData(name.to_string()))?
            .replace(values)
    }

    /// Remove an array.
    pub fn remove(&mut self, name: &str) -> Option<PointDataArray> {
        self.index_of(name).map(|i| self.arrays.remove(i))
    }

    /// Iterate over all arrays.
    pub fn iter(&self) -> impl Iterator<Item = &PointDataArray> + '_ {
        self.arrays.iter()
    }

    /// Names of all arrays.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.arrays.iter().map(|a| a.name.as_str())
    }

    pub(crate) fn remap(&mut self, sources: &[Vec<usize>]) {
        for array in &mut self.arrays {
            array.remap(sources);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_time_increases() {
        let a = ModifiedTime::now();
        let b = ModifiedTime::now();
        assert!(b > a);
        assert!(ModifiedTime::default() < a);
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut store = PointDataStore::new();
        let spec = FieldSpec::shared("Gauss_Curvature");
        assert!(store.declare("a", &spec, 4).unwrap());
        assert!(!store.declare("b", &spec, 4).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.values("Gauss_Curvature").unwrap().len(), 4);
    }

    #[test]
    fn test_declare_shape_mismatch() {
        let mut store = PointDataStore::new();
        store.declare("", &FieldSpec::shared("Normals"), 2).unwrap();
        let err = store
            .declare("", &FieldSpec::shared("Normals").with_components(3), 2)
            .unwrap_err();
        assert!(matches!(err, SculptError::FieldShapeMismatch { .. }));
    }

    #[test]
    fn test_private_fields_are_prefixed() {
        let mut store = PointDataStore::new();
        let spec = FieldSpec::private("Distance");
        store.declare("first", &spec, 1).unwrap();
        store.declare("second", &spec, 1).unwrap();
        assert!(store.contains("first/Distance"));
        assert!(store.contains("second/Distance"));
    }

    #[test]
    fn test_replace_stamps_time() {
        let mut store = PointDataStore::new();
        store.declare("", &FieldSpec::shared("f"), 2).unwrap();
        let before = store.get("f").unwrap().modified_time();
        store.replace("f", vec![1.0, 2.0]).unwrap();
        let array = store.get("f").unwrap();
        assert!(array.modified_time() > before);
        assert_eq!(array.values(), &[1.0, 2.0]);

        let err = store.replace("f", vec![1.0]).unwrap_err();
        assert!(matches!(err, SculptError::FieldLength { .. }));
        let err = store.replace("missing", vec![]).unwrap_err();
        assert!(matches!(err, SculptError::MissingPointData(_)));
    }

    #[test]
    fn test_remap_float_and_flag() {
        let mut float = PointDataArray::new("f", 1, ArrayKind::Float, 2, 0.0);
        float.replace(vec![1.0, 3.0]).unwrap();
        let mut flag = PointDataArray::new("s", 1, ArrayKind::Flag, 2, 1.0);
        flag.replace(vec![1.0, 0.0]).unwrap();

        let sources = vec![vec![0], vec![1], vec![0, 1]];
        float.remap(&sources);
        flag.remap(&sources);

        assert_eq!(float.values(), &[1.0, 3.0, 2.0]);
        assert_eq!(flag.values(), &[1.0, 0.0, 0.0]);
    }
}
