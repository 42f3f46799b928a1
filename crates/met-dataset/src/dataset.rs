//! In-memory dataset model: dimensions, f32 variables and string attributes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};

/// A named dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// A variable: row-major f32 values laid out over named dimensions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub dims: Vec<String>,
    pub data: Vec<f32>,
    pub attributes: BTreeMap<String, String>,
}

impl Variable {
    pub fn new<I, S>(dims: I, data: Vec<f32>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
            data,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A gridded dataset.
///
/// Dimensions keep their declaration order; variables and attributes are
/// keyed by name so that encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    dimensions: Vec<Dimension>,
    variables: BTreeMap<String, Variable>,
    attributes: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension. Re-declaring with the same length is a no-op.
    pub fn add_dimension(&mut self, name: impl Into<String>, len: usize) -> DatasetResult<()> {
        let name = name.into();
        match self.dimension_len(&name) {
            Some(existing) if existing == len => Ok(()),
            Some(existing) => Err(DatasetError::Dimension(format!(
                "{} already declared with length {}, not {}",
                name, existing, len
            ))),
            None => {
                self.dimensions.push(Dimension { name, len });
                Ok(())
            }
        }
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.len)
    }

    /// Shape of a variable, resolved against the declared dimensions.
    pub fn shape_of(&self, variable: &Variable) -> DatasetResult<Vec<usize>> {
        variable
            .dims
            .iter()
            .map(|dim| {
                self.dimension_len(dim)
                    .ok_or_else(|| DatasetError::Dimension(format!("unknown dimension {}", dim)))
            })
            .collect()
    }

    /// Add a new variable. Existing variables are never replaced.
    pub fn add_variable(&mut self, name: impl Into<String>, variable: Variable) -> DatasetResult<()> {
        let name = name.into();
        if self.variables.contains_key(&name) {
            return Err(DatasetError::DuplicateVariable(name));
        }

        let expected: usize = self.shape_of(&variable)?.iter().product();
        if expected != variable.data.len() {
            return Err(DatasetError::ShapeMismatch {
                name,
                expected,
                actual: variable.data.len(),
            });
        }

        self.variables.insert(name, variable);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> DatasetResult<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Join datasets along `dim`, in order.
    ///
    /// Every part must declare the same dimensions (only the length of
    /// `dim` may differ) and the same variables. Variables that do not span
    /// `dim`, and all attributes, are taken from the first part.
    pub fn concat(parts: &[Dataset], dim: &str) -> DatasetResult<Dataset> {
        let first = parts
            .first()
            .ok_or_else(|| DatasetError::Dimension(format!("no datasets to join along {}", dim)))?;

        let mut lens = Vec::with_capacity(parts.len());
        for part in parts {
            let len = part
                .dimension_len(dim)
                .ok_or_else(|| DatasetError::Dimension(format!("part without dimension {}", dim)))?;
            if part.dimensions.len() != first.dimensions.len()
                || first
                    .dimensions
                    .iter()
                    .any(|d| d.name != dim && part.dimension_len(&d.name) != Some(d.len))
            {
                return Err(DatasetError::Dimension(format!(
                    "parts disagree on dimensions other than {}",
                    dim
                )));
            }
            if let Some(name) = first.variables.keys().find(|k| !part.variables.contains_key(*k)) {
                return Err(DatasetError::MissingVariable(name.clone()));
            }
            lens.push(len);
        }
        let total: usize = lens.iter().sum();

        let mut joined = Dataset {
            dimensions: first
                .dimensions
                .iter()
                .map(|d| Dimension {
                    name: d.name.clone(),
                    len: if d.name == dim { total } else { d.len },
                })
                .collect(),
            variables: BTreeMap::new(),
            attributes: first.attributes.clone(),
        };

        for (name, variable) in &first.variables {
            let Some(axis) = variable.dims.iter().position(|d| d == dim) else {
                joined.variables.insert(name.clone(), variable.clone());
                continue;
            };
            let shape = first.shape_of(variable)?;
            let outer: usize = shape[..axis].iter().product();
            let inner: usize = shape[axis + 1..].iter().product();

            let mut data = Vec::with_capacity(outer * total * inner);
            for block in 0..outer {
                for (part, len) in parts.iter().zip(&lens) {
                    let piece = part.variable(name)?;
                    if piece.dims != variable.dims {
                        return Err(DatasetError::Dimension(format!(
                            "{} has different dimensions across parts",
                            name
                        )));
                    }
                    let chunk = len * inner;
                    let values = piece
                        .data
                        .get(block * chunk..(block + 1) * chunk)
                        .ok_or_else(|| DatasetError::ShapeMismatch {
                            name: name.clone(),
                            expected: outer * chunk,
                            actual: piece.data.len(),
                        })?;
                    data.extend_from_slice(values);
                }
            }

            joined.variables.insert(
                name.clone(),
                Variable {
                    dims: variable.dims.clone(),
                    data,
                    attributes: variable.attributes.clone(),
                },
            );
        }
        Ok(joined)
    }

    /// Field-level equality that treats NaN cells as equal when their bit
    /// patterns match.
    pub fn fields_equal(&self, other: &Dataset) -> bool {
        self.dimensions == other.dimensions
            && self.attributes == other.attributes
            && self.variables.len() == other.variables.len()
            && self.variables.iter().all(|(name, a)| {
                other.variables.get(name).is_some_and(|b| {
                    a.dims == b.dims
                        && a.attributes == b.attributes
                        && a.data.len() == b.data.len()
                        && a.data
                            .iter()
                            .zip(&b.data)
                            .all(|(x, y)| x.to_bits() == y.to_bits())
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_grid() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_dimension("lat", 2).unwrap();
        ds.add_dimension("lon", 3).unwrap();
        ds.add_variable("TS", Variable::new(["lat", "lon"], vec![280.0; 6]))
            .unwrap();
        ds
    }

    #[test]
    fn test_add_variable_validates_shape() {
        let mut ds = surface_grid();
        let err = ds
            .add_variable("bad", Variable::new(["lat", "lon"], vec![0.0; 5]))
            .unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { expected: 6, actual: 5, .. }));
    }

    #[test]
    fn test_add_variable_rejects_unknown_dimension() {
        let mut ds = surface_grid();
        let err = ds
            .add_variable("bad", Variable::new(["lev"], vec![0.0; 72]))
            .unwrap_err();
        assert!(matches!(err, DatasetError::Dimension(_)));
    }

    #[test]
    fn test_existing_variables_are_not_replaced() {
        let mut ds = surface_grid();
        let err = ds
            .add_variable("TS", Variable::new(["lat", "lon"], vec![0.0; 6]))
            .unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateVariable(_)));
        assert_eq!(ds.variable("TS").unwrap().data[0], 280.0);
    }

    #[test]
    fn test_dimension_redeclaration() {
        let mut ds = surface_grid();
        assert!(ds.add_dimension("lat", 2).is_ok());
        assert!(ds.add_dimension("lat", 4).is_err());
    }

    fn hourly(values: [f32; 2]) -> Dataset {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 1).unwrap();
        ds.add_dimension("lon", 2).unwrap();
        ds.add_variable("TS", Variable::new(["time", "lon"], values.to_vec()))
            .unwrap();
        ds.add_variable("lon", Variable::new(["lon"], vec![0.0, 180.0]))
            .unwrap();
        ds.set_attribute("title", "hour");
        ds
    }

    #[test]
    fn test_concat_along_time() {
        let joined = Dataset::concat(&[hourly([1.0, 2.0]), hourly([3.0, 4.0])], "time").unwrap();
        assert_eq!(joined.dimension_len("time"), Some(2));
        assert_eq!(joined.variable("TS").unwrap().data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(joined.variable("lon").unwrap().data, vec![0.0, 180.0]);
        assert_eq!(joined.attribute("title"), Some("hour"));
    }

    #[test]
    fn test_concat_along_inner_axis_interleaves() {
        let part = |values: Vec<f32>| {
            let mut ds = Dataset::new();
            ds.add_dimension("lat", 2).unwrap();
            ds.add_dimension("time", 1).unwrap();
            ds.add_variable("TS", Variable::new(["lat", "time"], values)).unwrap();
            ds
        };
        let joined = Dataset::concat(&[part(vec![1.0, 2.0]), part(vec![3.0, 4.0])], "time").unwrap();
        assert_eq!(joined.variable("TS").unwrap().data, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_concat_rejects_mismatched_parts() {
        let mut other = Dataset::new();
        other.add_dimension("time", 1).unwrap();
        other.add_dimension("lon", 3).unwrap();
        other
            .add_variable("TS", Variable::new(["time", "lon"], vec![0.0; 3]))
            .unwrap();
        assert!(Dataset::concat(&[hourly([1.0, 2.0]), other], "time").is_err());
        assert!(Dataset::concat(&[], "time").is_err());
        assert!(Dataset::concat(&[surface_grid()], "time").is_err());
    }

    #[test]
    fn test_fields_equal_with_nan() {
        let mut a = surface_grid();
        a.add_variable("M", Variable::new(["lon"], vec![f32::NAN, 1.0, 2.0]))
            .unwrap();
        let b = a.clone();
        assert!(a.fields_equal(&b));
        assert_ne!(a, b);
    }
}
