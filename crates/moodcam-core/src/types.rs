use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Label shown when a capture yields no face or no expression data.
pub const NO_FACE_LABEL: &str = "No face detected";

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Facial expression categories, in the classifier's output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
    Disgusted,
    Fearful,
    Contempt,
}

impl Expression {
    pub const COUNT: usize = 8;

    pub const ALL: [Expression; Expression::COUNT] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Surprised,
        Expression::Sad,
        Expression::Angry,
        Expression::Disgusted,
        Expression::Fearful,
        Expression::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Surprised => "surprised",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Contempt => "contempt",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expression weights for one face, one slot per [`Expression`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionScores {
    weights: [f32; Expression::COUNT],
}

impl ExpressionScores {
    pub fn from_weights(weights: [f32; Expression::COUNT]) -> Self {
        Self { weights }
    }

    /// Build from named weights. Categories not mentioned get 0.0.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Expression, f32)>) -> Self {
        let mut weights = [0.0f32; Expression::COUNT];
        for (expression, weight) in pairs {
            weights[expression.index()] = weight;
        }
        Self { weights }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.iter().copied().zip(self.weights.iter().copied())
    }

    /// The highest-weighted expression.
    ///
    /// Ties resolve to the category listed first in [`Expression::ALL`].
    /// NaN weights are never selected; returns `None` if every weight is NaN.
    pub fn dominant(&self) -> Option<(Expression, f32)> {
        let mut best: Option<(Expression, f32)> = None;
        for (expression, weight) in self.iter() {
            if weight.is_nan() {
                continue;
            }
            match best {
                Some((_, best_weight)) if weight <= best_weight => {}
                _ => best = Some((expression, weight)),
            }
        }
        best
    }
}

/// Outcome of one capture-and-classify action.
#[derive(Debug, Clone, PartialEq)]
pub enum EmotionResult {
    /// A face was found; `confidence` is a percentage rounded to two decimals.
    Detected {
        expression: Expression,
        confidence: f32,
    },
    /// No face, or the face produced no expression data.
    NoFace,
}

impl EmotionResult {
    /// Pick the dominant expression and convert its weight to a percentage.
    pub fn from_scores(scores: &ExpressionScores) -> Self {
        match scores.dominant() {
            Some((expression, weight)) => EmotionResult::Detected {
                expression,
                confidence: to_percent(weight),
            },
            None => EmotionResult::NoFace,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EmotionResult::Detected { expression, .. } => expression.as_str(),
            EmotionResult::NoFace => NO_FACE_LABEL,
        }
    }

    /// Confidence percentage in [0, 100]; always 0 for [`EmotionResult::NoFace`].
    pub fn confidence(&self) -> f32 {
        match self {
            EmotionResult::Detected { confidence, .. } => *confidence,
            EmotionResult::NoFace => 0.0,
        }
    }

    /// Confidence with exactly two decimals, e.g. `"81.00"`.
    pub fn confidence_text(&self) -> String {
        format!("{:.2}", self.confidence())
    }

    /// Whether a confidence line should be shown at all.
    pub fn has_confidence(&self) -> bool {
        self.confidence() > 0.0
    }
}

impl Serialize for EmotionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EmotionResult", 2)?;
        state.serialize_field("label", self.label())?;
        state.serialize_field("confidence", &self.confidence())?;
        state.end()
    }
}

fn to_percent(weight: f32) -> f32 {
    ((weight * 10_000.0).round() / 100.0).clamp(0.0, 100.0)
}
