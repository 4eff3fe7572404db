use super::contact::ContactCv;
use super::error::CvError;
use super::rmsd::RmsdCv;
use crate::core::models::trajectory::Trajectory;
use nalgebra::{DMatrix, DVector};
use std::fmt;

/// Spread below which a fitted scale falls back to the maximum value.
pub const NORMALIZATION_EPSILON: f64 = 1e-4;

/// Produces raw CV values from a trajectory, one row per frame.
pub trait CvGenerator {
    fn generate(&self, trajectory: &Trajectory) -> Result<DMatrix<f64>, CvError>;
}

/// The closed set of CV evaluation functions.
#[derive(Debug, Clone, PartialEq)]
pub enum CvKind {
    Contact(ContactCv),
    InverseContact(ContactCv),
    Rmsd(RmsdCv),
}

impl CvKind {
    /// Discriminator used in CV definition files.
    pub fn class_name(&self) -> &'static str {
        match self {
            CvKind::Contact(_) => "ContactCv",
            CvKind::InverseContact(_) => "InverseContactCv",
            CvKind::Rmsd(_) => "RmsdCv",
        }
    }
}

impl CvGenerator for CvKind {
    fn generate(&self, trajectory: &Trajectory) -> Result<DMatrix<f64>, CvError> {
        match self {
            CvKind::Contact(cv) => cv.generate(trajectory),
            CvKind::InverseContact(cv) => Ok(cv.generate(trajectory)?.map(|d| 1.0 / d)),
            CvKind::Rmsd(cv) => cv.generate(trajectory),
        }
    }
}

/// Affine map between raw and normalized CV values.
///
/// Normalized values are `(raw - offset) / scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f64,
    pub offset: f64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl Normalization {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Fits offset and scale to the global minimum and maximum of the raw
    /// values over all trajectories.
    pub fn fit(
        generator: &impl CvGenerator,
        trajectories: &[Trajectory],
    ) -> Result<Self, CvError> {
        let mut bounds: Option<(f64, f64)> = None;
        for trajectory in trajectories {
            let values = generator.generate(trajectory)?;
            if values.is_empty() {
                continue;
            }
            let (tmin, tmax) = (values.min(), values.max());
            bounds = Some(match bounds {
                None => (tmin, tmax),
                Some((min, max)) => (min.min(tmin), max.max(tmax)),
            });
        }
        let (min, max) = bounds.ok_or(CvError::NoFrames)?;
        let scale = if max > min + NORMALIZATION_EPSILON {
            max - min
        } else {
            max
        };
        Ok(Self { scale, offset: min })
    }

    /// Maps a normalized value back to physical units.
    #[inline]
    pub fn rescale(&self, x: f64) -> f64 {
        self.scale * x + self.offset
    }

    #[inline]
    pub fn scale_to_normalized(&self, x: f64) -> f64 {
        (x - self.offset) / self.scale
    }
}

/// A named scalar projection of a trajectory with its normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveVariable {
    id: String,
    name: String,
    importance: Option<f64>,
    generator: Option<CvKind>,
    normalization: Normalization,
}

impl CollectiveVariable {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            importance: None,
            generator: None,
            normalization: Normalization::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_importance(mut self, importance: Option<f64>) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_generator(mut self, generator: CvKind) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn importance(&self) -> Option<f64> {
        self.importance
    }

    pub fn generator(&self) -> Option<&CvKind> {
        self.generator.as_ref()
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    fn require_generator(&self) -> Result<&CvKind, CvError> {
        self.generator.as_ref().ok_or_else(|| CvError::MissingGenerator {
            id: self.id.clone(),
        })
    }

    /// Raw values, one per frame.
    pub fn eval_raw(&self, trajectory: &Trajectory) -> Result<DVector<f64>, CvError> {
        let values = self.require_generator()?.generate(trajectory)?;
        squeeze(values)
    }

    /// Normalized values, one per frame.
    pub fn eval(&self, trajectory: &Trajectory) -> Result<DVector<f64>, CvError> {
        let n = self.normalization;
        Ok(self
            .eval_raw(trajectory)?
            .map(|raw| n.scale_to_normalized(raw)))
    }

    /// Returns the normalization fitted on `trajectories`, or the explicit
    /// `scale` and `offset` when no trajectory is given.
    ///
    /// The CV itself is unchanged; apply the result with
    /// [`with_normalization`](Self::with_normalization).
    pub fn normalize(
        &self,
        trajectories: &[Trajectory],
        scale: f64,
        offset: f64,
    ) -> Result<Normalization, CvError> {
        if trajectories.is_empty() {
            return Ok(Normalization::new(scale, offset));
        }
        Normalization::fit(self.require_generator()?, trajectories)
    }

    pub fn rescale(&self, x: f64) -> f64 {
        self.normalization.rescale(x)
    }

    pub fn scale_to_normalized(&self, x: f64) -> f64 {
        self.normalization.scale_to_normalized(x)
    }
}

impl fmt::Display for CollectiveVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Flattens a matrix with a single row or column into a vector.
fn squeeze(values: DMatrix<f64>) -> Result<DVector<f64>, CvError> {
    let (rows, cols) = values.shape();
    if cols == 1 || rows == 1 {
        Ok(DVector::from_iterator(rows * cols, values.iter().copied()))
    } else if rows == 0 || cols == 0 {
        Ok(DVector::zeros(0))
    } else {
        Err(CvError::ShapeMismatch {
            expected: "a single value per frame".into(),
            found: format!("{rows}x{cols} matrix"),
        })
    }
}
