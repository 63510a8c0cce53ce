use crate::identity::domain::identity_store::{IdentityStore, UserRecord};
use crate::recognition::domain::face_recognizer::Prediction;
use crate::shared::constants::{CONFIDENCE_BASE, RECOGNITION_MAX_DISTANCE};

/// Gate outcome for one face. Both fields are `None` when unrecognized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recognition {
    pub identity: Option<UserRecord>,
    pub confidence: Option<i32>,
}

impl Recognition {
    pub fn unrecognized() -> Self {
        Self::default()
    }

    pub fn is_recognized(&self) -> bool {
        self.identity.is_some()
    }
}

/// Accepts predictions at or below `max_distance` whose label resolves to
/// a user, scoring them `base - distance` rounded half to even.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    max_distance: f64,
    base: f64,
}

impl ConfidenceGate {
    pub fn new(max_distance: f64, base: f64) -> Self {
        Self { max_distance, base }
    }

    pub fn evaluate(&self, prediction: Prediction, identities: &dyn IdentityStore) -> Recognition {
        if prediction.distance.is_nan() || prediction.distance > self.max_distance {
            return Recognition::unrecognized();
        }
        match identities.find_one(prediction.label) {
            Some(user) => Recognition {
                identity: Some(user),
                confidence: Some((self.base - prediction.distance).round_ties_even() as i32),
            },
            None => {
                log::debug!("Label {} matched but has no active identity", prediction.label);
                Recognition::unrecognized()
            }
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(RECOGNITION_MAX_DISTANCE, CONFIDENCE_BASE)
    }
}
