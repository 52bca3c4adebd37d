use serde::{Deserialize, Serialize};

/// Anything that lives in a fixed-dimensional feature space.
///
/// All the points of a set handed to a selector must agree on both
/// dimensions, which is checked before any selection state is built.
pub trait Point {
    fn dimension(&self) -> usize;

    /// Dimension of the auxiliary coordinates used by leveraged kernels.
    fn leverage_dimension(&self) -> usize {
        0
    }
}

/// A vector in a d-dimensional space.
///
/// Coordinates are stored as f64: determinants of Gram matrices shrink
/// geometrically with the size of the selection, and f32 runs out of
/// precision after a handful of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn squared_euclidean(&self, other: &Self) -> f64 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum()
    }

    pub fn cityblock(&self, other: &Self) -> f64 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y).abs())
            .sum()
    }
}

impl From<Vec<f64>> for Vector {
    fn from(data: Vec<f64>) -> Self {
        Self::new(data)
    }
}

impl Point for Vector {
    fn dimension(&self) -> usize {
        self.data.len()
    }
}

/// A feature vector paired with "leverage" coordinates, which bias the
/// similarity by a secondary distance signal.
///
/// Leverage coordinates are expected to be normalized so that the L1
/// distance between any two of them lies in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeveragedVector {
    pub vector: Vector,
    pub leverage: Vector,
}

impl LeveragedVector {
    pub fn new(vector: Vec<f64>, leverage: Vec<f64>) -> Self {
        Self {
            vector: Vector::new(vector),
            leverage: Vector::new(leverage),
        }
    }
}

impl Point for LeveragedVector {
    fn dimension(&self) -> usize {
        self.vector.dimension()
    }

    fn leverage_dimension(&self) -> usize {
        self.leverage.dimension()
    }
}

#[test]
fn test_vector_distances() {
    let a = Vector::new(vec![0.0, 0.0, 1.0]);
    let b = Vector::new(vec![1.0, -2.0, 1.0]);
    assert_eq!(a.squared_euclidean(&b), 5.0);
    assert_eq!(a.cityblock(&b), 3.0);
    assert_eq!(a.squared_euclidean(&a), 0.0);
}

#[test]
fn test_leveraged_dimensions() {
    let p = LeveragedVector::new(vec![0.0, 1.0, 2.0], vec![0.5]);
    assert_eq!(p.dimension(), 3);
    assert_eq!(p.leverage_dimension(), 1);
    assert_eq!(Vector::new(vec![1.0]).leverage_dimension(), 0);
}
