//! Color reduction for decoded images
//!
//! A [`ColorStrategy`] turns a decoded pixel grid into one representative
//! [`Color`] from the xterm-256 palette. The pipeline only sees the trait, so
//! strategies are interchangeable per service through [`StrategyKind`].

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};
use tokio_util::sync::CancellationToken;

use crate::errors::ColorError;

pub mod palette;
pub mod strategies;

pub use strategies::{Dominant, FirstNonGray, Mean};

/// Pixels scanned between two cancellation checks inside a strategy
pub const CANCEL_CHECK_INTERVAL: usize = 4096;

/// A palette color: the xterm-256 index and the RGB value it stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub xterm: u8,
    pub rgb: [u8; 3],
}

impl Color {
    /// Lowercase `#rrggbb` form
    pub fn hex(&self) -> String {
        let [r, g, b] = self.rgb;
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// A color is gray when all three channels are equal
    pub fn is_gray(&self) -> bool {
        let [r, g, b] = self.rgb;
        r == g && g == b
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hex(), self.xterm)
    }
}

/// Reduces a pixel grid to one palette color.
///
/// Implementations run on a blocking thread and must poll `cancel` at least
/// once every [`CANCEL_CHECK_INTERVAL`] pixels.
pub trait ColorStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn compute(&self, image: &RgbaImage, cancel: &CancellationToken) -> Result<Color, ColorError>;
}

/// Selects one of the built-in strategies
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    FirstNonGray,
    Dominant,
    Mean,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn ColorStrategy> {
        match self {
            StrategyKind::FirstNonGray => Arc::new(FirstNonGray),
            StrategyKind::Dominant => Arc::new(Dominant),
            StrategyKind::Mean => Arc::new(Mean),
        }
    }
}
